pub use button_click::*;
pub use page_view::*;

mod button_click;
mod page_view;
