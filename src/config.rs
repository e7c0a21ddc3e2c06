use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Image run by the proxy Deployment.
    /// Env: BALANCER_PROXY_IMAGE
    #[envconfig(from = "BALANCER_PROXY_IMAGE", default = "nginx:1.25")]
    pub proxy_image: String,

    /// Periodic requeue interval for a successfully reconciled Balancer.
    /// Env: BALANCER_REQUEUE_SECS
    #[envconfig(from = "BALANCER_REQUEUE_SECS", default = "300")]
    pub requeue_secs: u64,

    /// Requeue delay after a failed pass.
    /// Env: BALANCER_ERROR_REQUEUE_SECS
    #[envconfig(from = "BALANCER_ERROR_REQUEUE_SECS", default = "15")]
    pub error_requeue_secs: u64,

    /// Upper bound on concurrent backend Service writes per phase.
    /// Env: BALANCER_APPLY_CONCURRENCY
    #[envconfig(from = "BALANCER_APPLY_CONCURRENCY", default = "8")]
    pub apply_concurrency: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // init_from_hashmap avoids touching process env in tests.
        let cfg =
            OperatorConfig::init_from_hashmap(&Default::default()).unwrap();
        assert_eq!(cfg.proxy_image, "nginx:1.25");
        assert_eq!(cfg.requeue_secs, 300);
        assert_eq!(cfg.error_requeue_secs, 15);
        assert_eq!(cfg.apply_concurrency, 8);
    }

    #[test]
    fn overrides_win() {
        let mut env = std::collections::HashMap::new();
        env.insert(
            "BALANCER_PROXY_IMAGE".to_string(),
            "nginx:1.27-alpine".to_string(),
        );
        env.insert("BALANCER_APPLY_CONCURRENCY".to_string(), "2".to_string());
        let cfg = OperatorConfig::init_from_hashmap(&env).unwrap();
        assert_eq!(cfg.proxy_image, "nginx:1.27-alpine");
        assert_eq!(cfg.apply_concurrency, 2);
    }
}
