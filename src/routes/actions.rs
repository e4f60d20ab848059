//! Action Router Module
//!
//! The `/actions` resource is declared as data: one `ActionRoute` per
//! (method, path) with the roles it admits and the operation it dispatches to.
//! `action_routes()` builds the table once at startup; `action_router()` turns
//! it into an Axum router with the role guard on every endpoint.

use std::collections::BTreeMap;

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{MethodFilter, MethodRouter, on},
};

use crate::{
    AppState,
    auth::{RoleGuard, require_roles},
    handlers,
    models::Role,
};

const PATIENT_DOCTOR: &[Role] = &[Role::Patient, Role::Doctor];
const ANY_ACTOR: &[Role] = &[Role::Patient, Role::Doctor, Role::Receptionist];

/// The six controller operations of the actions resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOperation {
    Create,
    List,
    Get,
    ListByPatient,
    Update,
    Delete,
}

impl ActionOperation {
    pub fn handler_name(&self) -> &'static str {
        match self {
            ActionOperation::Create => "create_action",
            ActionOperation::List => "get_all_actions",
            ActionOperation::Get => "get_action_by_id",
            ActionOperation::ListByPatient => "get_actions_by_patient_id",
            ActionOperation::Update => "update_action",
            ActionOperation::Delete => "delete_action",
        }
    }

    fn endpoint(self, filter: MethodFilter) -> MethodRouter<AppState> {
        match self {
            ActionOperation::Create => on(filter, handlers::create_action),
            ActionOperation::List => on(filter, handlers::get_all_actions),
            ActionOperation::Get => on(filter, handlers::get_action_by_id),
            ActionOperation::ListByPatient => on(filter, handlers::get_actions_by_patient_id),
            ActionOperation::Update => on(filter, handlers::update_action),
            ActionOperation::Delete => on(filter, handlers::delete_action),
        }
    }
}

/// One row of the routing table.
#[derive(Debug, Clone)]
pub struct ActionRoute {
    pub method: Method,
    pub path: &'static str,
    pub allowed_roles: &'static [Role],
    pub operation: ActionOperation,
}

impl ActionRoute {
    /// The endpoint for this row, wrapped in the role guard.
    ///
    /// `route_layer` keeps the guard off the method fallback, so an unknown
    /// method on a known path answers 405 without an authentication attempt.
    fn method_router(&self, state: &AppState) -> MethodRouter<AppState> {
        let filter = MethodFilter::try_from(self.method.clone()).unwrap_or_else(|_| {
            panic!(
                "routing table entry {} {} uses an unroutable method",
                self.method, self.path
            )
        });
        let guard = RoleGuard::new(state.clone(), self.allowed_roles);

        self.operation
            .endpoint(filter)
            .route_layer(middleware::from_fn_with_state(guard, require_roles))
    }
}

/// action_routes
///
/// The exhaustive routing table for the actions resource.
pub fn action_routes() -> Vec<ActionRoute> {
    vec![
        // POST /actions
        ActionRoute {
            method: Method::POST,
            path: "/actions",
            allowed_roles: PATIENT_DOCTOR,
            operation: ActionOperation::Create,
        },
        // GET /actions
        ActionRoute {
            method: Method::GET,
            path: "/actions",
            allowed_roles: ANY_ACTOR,
            operation: ActionOperation::List,
        },
        // GET /actions/{id}
        ActionRoute {
            method: Method::GET,
            path: "/actions/{id}",
            allowed_roles: ANY_ACTOR,
            operation: ActionOperation::Get,
        },
        // GET /actions/patient/{patient_id}
        // The static `patient` segment takes priority over the `{id}` capture.
        ActionRoute {
            method: Method::GET,
            path: "/actions/patient/{patient_id}",
            allowed_roles: ANY_ACTOR,
            operation: ActionOperation::ListByPatient,
        },
        // PUT /actions/{id}
        ActionRoute {
            method: Method::PUT,
            path: "/actions/{id}",
            allowed_roles: PATIENT_DOCTOR,
            operation: ActionOperation::Update,
        },
        // DELETE /actions/{id}
        ActionRoute {
            method: Method::DELETE,
            path: "/actions/{id}",
            allowed_roles: PATIENT_DOCTOR,
            operation: ActionOperation::Delete,
        },
    ]
}

/// action_router
///
/// Builds the router for a routing table. Rows sharing a path are merged into
/// one method router; each method keeps its own role guard.
///
/// # Panics
/// Panics if two rows declare the same (method, path).
pub fn action_router(state: &AppState, routes: &[ActionRoute]) -> Router<AppState> {
    let mut by_path: BTreeMap<&'static str, MethodRouter<AppState>> = BTreeMap::new();

    for route in routes {
        tracing::debug!(
            method = %route.method,
            path = route.path,
            roles = ?route.allowed_roles,
            handler = route.operation.handler_name(),
            "registering action route"
        );

        let endpoint = route.method_router(state);
        let merged = match by_path.remove(route.path) {
            Some(existing) => existing.merge(endpoint),
            None => endpoint,
        };
        by_path.insert(route.path, merged);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, endpoint)| {
            router.route(path, endpoint)
        })
}
