// Client-side state: the session store and the role cache

pub mod role_cache;
pub mod session_store;
