use secrecy::SecretString;

/// Process-wide configuration resolved once at startup and injected
/// everywhere else; nothing re-reads the environment per request.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
    pub development: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString, development: bool) -> Self {
        Self {
            jwt_secret,
            development,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(SecretString::from("sss".to_string()), true);
        assert_eq!(args.jwt_secret.expose_secret(), "sss");
        assert!(args.development);
    }
}
