pub mod ai;
pub mod analysis;
mod busy;
pub mod capture;
pub mod chat;
pub mod payload;
pub mod settings;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;
