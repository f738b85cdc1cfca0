pub mod capture;
pub mod detection;
pub mod events;
pub mod signals;
