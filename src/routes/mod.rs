/// Router Module Index
///
/// Splits routing by access level. Public routes carry no auth; every action
/// route is declared in a single table together with the roles it admits.

/// Routes accessible to any client (health check).
pub mod public;

/// The declarative routing table for the `/actions` resource and the router built from it.
pub mod actions;
