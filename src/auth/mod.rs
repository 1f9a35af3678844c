// Session lifecycle, role resolution and access decisions

pub mod access_gate;
pub mod credentials;
pub mod reducer;
pub mod role_admin;
pub mod role_resolver;
