//! Chat link generation for phone numbers and Telegram handles.
//!
//! Pure functions, no network access.

/// Country prefix applied to national numbers.
pub const COUNTRY_PREFIX: &str = "62";

/// Normalize a phone number to international digits.
///
/// Strips every non-digit, then maps a leading trunk `0` (or a missing
/// country code) to [`COUNTRY_PREFIX`].
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with(COUNTRY_PREFIX) {
        digits
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{COUNTRY_PREFIX}{rest}")
    } else {
        format!("{COUNTRY_PREFIX}{digits}")
    }
}

/// Chat-with-number URL.
pub fn whatsapp_link(phone: &str) -> String {
    format!("https://wa.me/{}", normalize_phone(phone))
}

/// Display form of a phone number, e.g. `+6281234567890`.
pub fn format_phone_number(phone: &str) -> String {
    format!("+{}", normalize_phone(phone))
}

/// Handle without its leading `@`.
pub fn normalize_handle(handle: &str) -> &str {
    let trimmed = handle.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}

/// Chat-with-handle URL.
pub fn telegram_link(handle: &str) -> String {
    format!("https://t.me/{}", normalize_handle(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trunk_zero_is_replaced() {
        let link = whatsapp_link("081234567890");
        assert!(link.contains("6281234567890"));
        assert_eq!(link, "https://wa.me/6281234567890");
    }

    #[test]
    fn test_existing_country_code_is_kept() {
        assert_eq!(normalize_phone("+62 812-3456-7890"), "6281234567890");
    }

    #[test]
    fn test_missing_country_code_is_added() {
        assert_eq!(normalize_phone("812 3456"), "628123456");
    }

    #[test]
    fn test_format_phone_number() {
        assert_eq!(format_phone_number("0812-3456"), "+628123456");
    }

    #[test]
    fn test_handle_strips_leading_at() {
        let link = telegram_link("@nama");
        assert!(link.contains("nama"));
        assert!(!link.contains('@'));
        assert_eq!(link, "https://t.me/nama");
        assert_eq!(telegram_link("nama"), "https://t.me/nama");
    }

    proptest! {
        #[test]
        fn normalized_phone_is_prefixed_digits(input in ".{0,24}") {
            let out = normalize_phone(&input);
            prop_assert!(out.starts_with(COUNTRY_PREFIX));
            prop_assert!(out.chars().all(|c| c.is_ascii_digit()));
        }

        #[test]
        fn normalization_is_idempotent(input in "[0-9 +()-]{0,20}") {
            let once = normalize_phone(&input);
            prop_assert_eq!(normalize_phone(&once), once.clone());
        }
    }
}
