pub mod boundary_loader;
pub mod points_loader;
