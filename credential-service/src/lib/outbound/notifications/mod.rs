pub mod http;
pub mod log;

pub use self::http::HttpResetNotifier;
pub use self::log::LogResetNotifier;

/// Build the link a user follows to finish a reset.
pub fn reset_link(base: &str, opaque_id: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", base, separator, opaque_id)
}
