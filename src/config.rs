pub fn get_bind_address() -> String {
    std::env::var("BIND_ADDRESS").unwrap_or_else(|_| {
        let default = "0.0.0.0:8080".to_string();
        tracing::trace!("BIND_ADDRESS not set, using default: {default}");
        default
    })
}

pub fn get_log_filter() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let default = "info".to_string();
        tracing::trace!("RUST_LOG not set, using default: {default}");
        default
    })
}
