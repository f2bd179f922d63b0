use secrecy::SecretString;

/// Process-wide configuration shared across CLI actions.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub webhook_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(webhook_secret: SecretString) -> Self {
        Self { webhook_secret }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(SecretString::from("whsec_test".to_string()));
        assert_eq!(args.webhook_secret.expose_secret(), "whsec_test");
    }
}
