// Hosted backend adapters

pub mod supabase;
pub mod supabase_auth;
pub mod supabase_store;
