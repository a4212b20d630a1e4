pub mod aligners;
pub mod alignment;
pub mod gap_costs;
pub mod io;
pub mod matrix;
pub mod score;
pub mod scoring;
pub mod traceback;
pub mod view;
