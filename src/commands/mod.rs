pub mod config;
mod install;
mod list;
mod refresh;
mod remove;
mod request;
mod toggle;

pub use install::{install, upgrade};
pub use list::{list, repos, search};
pub use refresh::refresh;
pub use remove::remove;
pub use request::PackageRequest;
pub use toggle::{disable, enable};
