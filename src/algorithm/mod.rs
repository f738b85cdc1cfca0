pub mod countdown;
pub mod tracking;
pub mod zoom;
