pub mod agree;
pub mod batch;
pub mod consensus;
pub mod detect;
pub mod methods;
pub mod params;
pub mod validate;
