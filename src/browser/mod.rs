//! 浏览器层：驱动抽象、Chrome 实现（feature "browser"）与 Mock 实现

pub mod driver;
pub mod mock;

#[cfg(feature = "browser")]
pub mod chrome;

pub use driver::{scripts, BrowserLauncher, PageDriver, PageScript};
pub use mock::{MockBrowser, MockPage, PageCall};

#[cfg(feature = "browser")]
pub use chrome::{ChromeLauncher, ChromePage};
