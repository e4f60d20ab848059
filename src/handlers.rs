use crate::{
    AppState,
    error::ApiError,
    extract::ValidatedJson,
    models::{Action, Actor, CreateActionRequest, NewAction, Role, UpdateActionRequest},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;

// --- Actor references ---

/// Checks that `id` names an existing actor holding `role`.
///
/// A dangling or mistyped reference is a bad payload, so it is reported as a
/// validation error on `field`.
async fn require_actor_role(
    state: &AppState,
    field: &str,
    id: &str,
    role: Role,
) -> Result<(), ApiError> {
    match state.repo.get_actor(id).await? {
        Some(actor) if actor.role == role => Ok(()),
        Some(_) => Err(ApiError::Validation(format!("{field} must reference a {role}"))),
        None => Err(ApiError::Validation(format!("{field} references an unknown actor"))),
    }
}

/// Patients never choose who performed an action; a given `performed_by`
/// must name a doctor.
async fn check_performed_by(
    state: &AppState,
    actor: &Actor,
    performed_by: Option<&str>,
) -> Result<(), ApiError> {
    let Some(doctor_id) = performed_by else {
        return Ok(());
    };
    if actor.role == Role::Patient {
        return Err(ApiError::Forbidden);
    }
    require_actor_role(state, "performed_by", doctor_id, Role::Doctor).await
}

// --- Handlers ---
//
// Every handler here sits behind `auth::require_roles`, so the `Actor` argument is
// the identity the guard already resolved and admitted.

/// create_action
///
/// [patient, doctor] Records a new action.
///
/// A patient always records for themself; naming another patient or setting
/// `performed_by` is forbidden. A doctor must name an existing patient and is
/// the default `performed_by`; an explicit one must be a doctor.
#[utoipa::path(
    post,
    path = "/actions",
    request_body = CreateActionRequest,
    responses(
        (status = 201, description = "Created", body = Action),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Role not allowed, another patient's record, or a patient setting performed_by")
    )
)]
pub async fn create_action(
    actor: Actor,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateActionRequest>,
) -> Result<(StatusCode, Json<Action>), ApiError> {
    let patient_id = match actor.patient_scope() {
        Some(own_id) => match payload.patient_id.as_deref() {
            Some(requested) if requested != own_id => return Err(ApiError::Forbidden),
            _ => own_id.to_string(),
        },
        None => {
            let patient_id = payload
                .patient_id
                .clone()
                .ok_or_else(|| ApiError::Validation("patient_id is required".to_string()))?;
            require_actor_role(&state, "patient_id", &patient_id, Role::Patient).await?;
            patient_id
        }
    };
    check_performed_by(&state, &actor, payload.performed_by.as_deref()).await?;

    let performed_by = payload
        .performed_by
        .or_else(|| (actor.role == Role::Doctor).then(|| actor.id.clone()));

    let new_action = NewAction {
        patient_id,
        performed_by,
        kind: payload.kind,
        description: payload.description.unwrap_or_default(),
        performed_at: payload.performed_at.unwrap_or_else(Utc::now),
        created_by: actor.id.clone(),
    };

    let action = state.repo.create_action(new_action).await?;
    tracing::info!(action_id = %action.id, patient_id = %action.patient_id, created_by = %actor.id, "action created");

    Ok((StatusCode::CREATED, Json(action)))
}

/// get_all_actions
///
/// [patient, doctor, receptionist] Lists the actions visible to the caller:
/// a patient's own actions, or every action for staff.
#[utoipa::path(
    get,
    path = "/actions",
    responses((status = 200, description = "Visible actions", body = [Action]))
)]
pub async fn get_all_actions(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Action>>, ApiError> {
    let actions = state.repo.list_actions(actor.patient_scope()).await?;
    Ok(Json(actions))
}

/// get_action_by_id
///
/// [patient, doctor, receptionist] Retrieves one action. Another patient's
/// action is reported as missing rather than forbidden.
#[utoipa::path(
    get,
    path = "/actions/{id}",
    params(("id" = String, Path, description = "Action ID")),
    responses(
        (status = 200, description = "Found", body = Action),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_action_by_id(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Action>, ApiError> {
    state
        .repo
        .get_action(&id, actor.patient_scope())
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// get_actions_by_patient_id
///
/// [patient, doctor, receptionist] Lists every action of one patient.
/// Patients may only ask for their own id.
#[utoipa::path(
    get,
    path = "/actions/patient/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Patient actions", body = [Action]),
        (status = 403, description = "Another patient's records")
    )
)]
pub async fn get_actions_by_patient_id(
    actor: Actor,
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<Action>>, ApiError> {
    if !actor.can_access_patient(&patient_id) {
        return Err(ApiError::Forbidden);
    }
    let actions = state.repo.list_actions_for_patient(&patient_id).await?;
    Ok(Json(actions))
}

/// update_action
///
/// [patient, doctor] Partially updates an action.
///
/// *Ownership*: the repository applies the patient scope, so a patient touching
/// someone else's action gets a 404. `performed_by` follows the same rules as
/// on creation.
#[utoipa::path(
    put,
    path = "/actions/{id}",
    params(("id" = String, Path, description = "Action ID")),
    request_body = UpdateActionRequest,
    responses(
        (status = 200, description = "Updated", body = Action),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Patient setting performed_by"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_action(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateActionRequest>,
) -> Result<Json<Action>, ApiError> {
    check_performed_by(&state, &actor, payload.performed_by.as_deref()).await?;

    let updated = state
        .repo
        .update_action(&id, actor.patient_scope(), payload)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::info!(action_id = %updated.id, updated_by = %actor.id, "action updated");
    Ok(Json(updated))
}

/// delete_action
///
/// [patient, doctor] Removes an action. Same ownership rule as `update_action`.
#[utoipa::path(
    delete,
    path = "/actions/{id}",
    params(("id" = String, Path, description = "Action ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_action(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete_action(&id, actor.patient_scope()).await? {
        tracing::info!(action_id = %id, deleted_by = %actor.id, "action deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
