//! Auth provider implementations.

#[cfg(test)]
mod mock;
mod supabase;

#[cfg(test)]
pub use mock::MockAuthProvider;
pub use supabase::SupabaseAuthProvider;
