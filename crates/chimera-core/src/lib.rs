pub mod cutout;
pub mod engine;
pub mod error;
pub mod io;
pub mod phot;
pub mod pipeline;
pub mod plot;
pub mod record;
pub mod resolve;
