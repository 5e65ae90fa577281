//! DTMF (Dual-Tone Multi-Frequency) keypad digits

use std::fmt;
use std::time::Duration;

/// Default tone length sent with each digit
pub const DEFAULT_TONE_DURATION: Duration = Duration::from_millis(160);

/// DTMF digit representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtmfDigit {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Star,
    Pound,
}

impl DtmfDigit {
    /// Convert to character representation
    pub fn to_char(&self) -> char {
        match self {
            DtmfDigit::Zero => '0',
            DtmfDigit::One => '1',
            DtmfDigit::Two => '2',
            DtmfDigit::Three => '3',
            DtmfDigit::Four => '4',
            DtmfDigit::Five => '5',
            DtmfDigit::Six => '6',
            DtmfDigit::Seven => '7',
            DtmfDigit::Eight => '8',
            DtmfDigit::Nine => '9',
            DtmfDigit::Star => '*',
            DtmfDigit::Pound => '#',
        }
    }

    /// Parse from character
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(DtmfDigit::Zero),
            '1' => Some(DtmfDigit::One),
            '2' => Some(DtmfDigit::Two),
            '3' => Some(DtmfDigit::Three),
            '4' => Some(DtmfDigit::Four),
            '5' => Some(DtmfDigit::Five),
            '6' => Some(DtmfDigit::Six),
            '7' => Some(DtmfDigit::Seven),
            '8' => Some(DtmfDigit::Eight),
            '9' => Some(DtmfDigit::Nine),
            '*' => Some(DtmfDigit::Star),
            '#' => Some(DtmfDigit::Pound),
            _ => None,
        }
    }

    /// Body of a SIP INFO request (`application/dtmf-relay`)
    pub fn to_dtmf_relay(&self, duration: Duration) -> String {
        format!("Signal={}\r\nDuration={}\r\n", self.to_char(), duration.as_millis())
    }

    /// Parse an `application/dtmf-relay` body
    /// Format: "Signal=1\r\nDuration=160\r\n"
    pub fn from_dtmf_relay(body: &str) -> Option<Self> {
        body.lines()
            .filter_map(|line| line.split_once('='))
            .find(|(key, _)| key.trim() == "Signal")
            .and_then(|(_, value)| value.trim().chars().next())
            .and_then(Self::from_char)
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtmf_digit_conversion() {
        assert_eq!(DtmfDigit::Zero.to_char(), '0');
        assert_eq!(DtmfDigit::Nine.to_char(), '9');
        assert_eq!(DtmfDigit::Star.to_char(), '*');
        assert_eq!(DtmfDigit::Pound.to_char(), '#');

        assert_eq!(DtmfDigit::from_char('0'), Some(DtmfDigit::Zero));
        assert_eq!(DtmfDigit::from_char('5'), Some(DtmfDigit::Five));
        assert_eq!(DtmfDigit::from_char('*'), Some(DtmfDigit::Star));
        assert_eq!(DtmfDigit::from_char('#'), Some(DtmfDigit::Pound));
        assert_eq!(DtmfDigit::from_char('x'), None);
    }

    #[test]
    fn test_dtmf_relay_body() {
        let body = DtmfDigit::Five.to_dtmf_relay(DEFAULT_TONE_DURATION);
        assert_eq!(body, "Signal=5\r\nDuration=160\r\n");
        assert_eq!(DtmfDigit::from_dtmf_relay(&body), Some(DtmfDigit::Five));
        assert_eq!(DtmfDigit::from_dtmf_relay("Duration=100\r\n"), None);
    }
}
