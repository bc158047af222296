//! Payment-card input normalisation for the wallet preview widget.
//!
//! Nothing here fails: input is cleaned at the boundary (non-digits dropped,
//! lengths capped) and whatever remains is rendered.

use serde::Serialize;

pub const CARD_NUMBER_MAX_DIGITS: usize = 16;
pub const EXPIRY_MAX_DIGITS: usize = 4;
pub const CVV_MAX_DIGITS: usize = 4;

fn digits_capped(input: &str, cap: usize) -> String {
    input.chars().filter(char::is_ascii_digit).take(cap).collect()
}

pub fn sanitize_card_number(input: &str) -> String {
    digits_capped(input, CARD_NUMBER_MAX_DIGITS)
}

/// Groups digits in blocks of four: `4111 1111 1111 1111`.
pub fn format_card_number(digits: &str) -> String {
    let digits = sanitize_card_number(digits);
    digits
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps up to four digits and inserts the slash once the month is complete.
pub fn sanitize_expiry(input: &str) -> String {
    let digits = digits_capped(input, EXPIRY_MAX_DIGITS);
    if digits.len() > 2 {
        format!("{}/{}", &digits[..2], &digits[2..])
    } else {
        digits
    }
}

pub fn sanitize_cvv(input: &str) -> String {
    digits_capped(input, CVV_MAX_DIGITS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Unknown,
}

impl CardBrand {
    pub fn detect(digits: &str) -> Self {
        if digits.starts_with('4') {
            CardBrand::Visa
        } else if digits.starts_with("34") || digits.starts_with("37") {
            CardBrand::Amex
        } else if matches!(digits.get(..2), Some("51" | "52" | "53" | "54" | "55")) {
            CardBrand::Mastercard
        } else {
            CardBrand::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardPreview {
    pub masked_number: String,
    pub holder: String,
    pub expiry: String,
    pub brand: CardBrand,
    pub cvv_length: usize,
}

impl CardPreview {
    pub fn from_input(number: &str, holder: &str, expiry: &str, cvv: &str) -> Self {
        let digits = sanitize_card_number(number);
        let visible_from = digits.len().saturating_sub(4);
        let mut seen = 0;
        let masked_number = format_card_number(&digits)
            .chars()
            .map(|ch| {
                if !ch.is_ascii_digit() {
                    return ch;
                }
                seen += 1;
                if seen <= visible_from {
                    '•'
                } else {
                    ch
                }
            })
            .collect();
        let holder = holder.trim().to_uppercase();

        Self {
            masked_number,
            holder,
            expiry: sanitize_expiry(expiry),
            brand: CardBrand::detect(&digits),
            cvv_length: sanitize_cvv(cvv).len(),
        }
    }
}
