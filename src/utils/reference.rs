use uuid::Uuid;

pub const REFERENCE_PREFIX: &str = "zlma_";

/// 生成支付流水号：`zlma_` + 16 位十六进制
pub fn generate_payment_reference() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{REFERENCE_PREFIX}{}", &hex[..16])
}

/// 新记录主键
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let r = generate_payment_reference();
        assert!(r.starts_with("zlma_"));
        assert_eq!(r.len(), 5 + 16);
        assert!(r[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_references_differ() {
        assert_ne!(generate_payment_reference(), generate_payment_reference());
    }
}
