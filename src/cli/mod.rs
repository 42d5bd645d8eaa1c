pub mod enrich;
pub mod overview;
pub mod search;
pub mod setup;
pub mod spending;
pub mod ui;
