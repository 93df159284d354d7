// Crate identity from Cargo.toml, logged at startup

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `"<name> <version>"`
pub fn banner() -> String {
    format!("{NAME} {VERSION}")
}
