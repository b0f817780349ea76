use tracing::debug;

/// Installs the ring provider for the kube client's rustls stack. Calling it
/// more than once is harmless.
pub fn init_crypto() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}
