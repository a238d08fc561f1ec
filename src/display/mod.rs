//! Output seam: the presenter trait and its headless implementation.

mod headless;
mod presenter;

pub use headless::HeadlessPresenter;
pub use presenter::Presenter;
