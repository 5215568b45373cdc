mod activity;
mod analyst;
mod checklist;
mod comment;
mod health;
mod macro_insight;
mod portfolio;
mod project;
mod research;
mod theme;
mod watchlist;

pub use activity::*;
pub use analyst::*;
pub use checklist::*;
pub use comment::*;
pub use health::*;
pub use macro_insight::*;
pub use portfolio::*;
pub use project::*;
pub use research::*;
pub use theme::*;
pub use watchlist::*;
