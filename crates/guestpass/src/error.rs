use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuestpassError>;

#[derive(Error, Debug)]
pub enum GuestpassError {
    #[error("Code not found: {0}")]
    CodeNotFound(String),

    #[error("Code already redeemed: {0}")]
    AlreadyRedeemed(String),

    #[error("Promoter id must not be empty")]
    InvalidPromoter,

    #[error("QR encoding error: {0}")]
    QrEncoding(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuestpassError {
    /// Rejections a caller can show to the operator as-is. Anything else is a
    /// storage or encoding fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GuestpassError::CodeNotFound(_)
                | GuestpassError::AlreadyRedeemed(_)
                | GuestpassError::InvalidPromoter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_separated_from_faults() {
        assert!(GuestpassError::CodeNotFound("x".into()).is_rejection());
        assert!(GuestpassError::AlreadyRedeemed("x".into()).is_rejection());
        assert!(GuestpassError::InvalidPromoter.is_rejection());

        assert!(!GuestpassError::QrEncoding("bad".into()).is_rejection());
        assert!(!GuestpassError::Persistence(sqlx::Error::PoolTimedOut).is_rejection());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(!GuestpassError::Io(io).is_rejection());
    }
}
