/// Normalize a subscriber number to the gateway's 12-digit `254…` format.
/// Accepts `07XX…`/`01XX…`, `+254…`, `254…` and bare 9-digit local forms.
pub fn normalize_msisdn(phone: &str) -> Option<String> {
  let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

  let msisdn = if digits.len() == 12 && digits.starts_with("254") {
    digits
  } else if digits.len() == 10 && digits.starts_with('0') {
    format!("254{}", &digits[1..])
  } else if digits.len() == 9 {
    format!("254{digits}")
  } else {
    return None;
  };

  is_valid_msisdn(&msisdn).then_some(msisdn)
}

/// The fixed national pattern: `254` followed by nine digits.
pub fn is_valid_msisdn(msisdn: &str) -> bool {
  msisdn.len() == 12
    && msisdn.starts_with("254")
    && msisdn.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_local_format() {
    assert_eq!(
      normalize_msisdn("0712345678").as_deref(),
      Some("254712345678")
    );
    assert_eq!(
      normalize_msisdn("0110345678").as_deref(),
      Some("254110345678")
    );
  }

  #[test]
  fn test_normalize_international_format() {
    assert_eq!(
      normalize_msisdn("+254712345678").as_deref(),
      Some("254712345678")
    );
    assert_eq!(
      normalize_msisdn("254712345678").as_deref(),
      Some("254712345678")
    );
    assert_eq!(
      normalize_msisdn("712 345 678").as_deref(),
      Some("254712345678")
    );
  }

  #[test]
  fn test_normalize_rejects_garbage() {
    assert!(normalize_msisdn("12345").is_none());
    assert!(normalize_msisdn("").is_none());
    assert!(normalize_msisdn("07123456789012").is_none());
  }

  #[test]
  fn test_is_valid_msisdn() {
    assert!(is_valid_msisdn("254712345678"));
    assert!(!is_valid_msisdn("255712345678"));
    assert!(!is_valid_msisdn("25471234567"));
    assert!(!is_valid_msisdn("2547123456789"));
    assert!(!is_valid_msisdn("25471234567a"));
  }
}
