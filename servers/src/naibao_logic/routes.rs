use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::state::SharedState;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use lib_naibao::models::{BabyId, FeedingId, NewBaby, StandardEntry, UserId};
use lib_naibao::services::{
    BabyPatch, CreateFeedingRequest, CreatePlanRequest, FeedingRange, FormulaRequest, GrowthInput,
    PlanStatusRequest, PreferencePatch, SettingsPatch, UpdateFeedingRequest,
};
use lib_naibao::utils::CivilClock;
use serde::Deserialize;
use serde_json::{Value, json};

/// Reads a required, positive baby id from a query string value.
pub fn parse_baby_id(raw: Option<&str>) -> ApiResult<BabyId> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("baby_id is required"))?;
    match raw.parse::<BabyId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request(format!("invalid baby_id: {}", raw))),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare date. A bare date
/// covers the whole day, so it maps to midnight for a lower bound and to the
/// last instant of the day for an upper bound.
fn parse_bound(clock: &CivilClock, raw: Option<&str>, upper: bool) -> ApiResult<Option<NaiveDateTime>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(at) = clock.parse_rfc3339(raw) {
        return Ok(Some(at.naive_local()));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Some(at));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("invalid date: {}", raw)))?;
    let midnight = date.and_time(NaiveTime::MIN);
    Ok(Some(if upper {
        midnight + Duration::days(1) - Duration::nanoseconds(1)
    } else {
        midnight
    }))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// --- Babies & family ---

pub async fn create_baby(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(body): Json<NewBaby>,
) -> ApiResult<impl IntoResponse> {
    let baby = state.services.family.create_baby(user, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "baby": baby }))))
}

pub async fn list_babies(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let babies = state.services.family.list_babies(user).await?;
    Ok(Json(json!({ "babies": babies })))
}

pub async fn get_baby(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let baby = state.services.family.get_baby(user, baby_id).await?;
    Ok(Json(json!({ "baby": baby })))
}

pub async fn update_baby(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<BabyPatch>,
) -> ApiResult<Json<Value>> {
    let baby = state.services.family.update_baby(user, baby_id, body).await?;
    Ok(Json(json!({ "baby": baby })))
}

pub async fn delete_baby(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<StatusCode> {
    state.services.family.delete_baby(user, baby_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let members = state.services.family.list_members(user, baby_id).await?;
    Ok(Json(json!({ "members": members })))
}

pub async fn create_invite(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<impl IntoResponse> {
    let invite = state.services.family.create_invite(user, baby_id).await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn remove_member(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path((baby_id, member_id)): Path<(BabyId, UserId)>,
) -> ApiResult<StatusCode> {
    state.services.family.remove_member(user, baby_id, member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub code: String,
}

pub async fn redeem_invite(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(body): Json<RedeemBody>,
) -> ApiResult<Json<Value>> {
    let baby = state.services.family.redeem_invite(user, &body.code).await?;
    Ok(Json(json!({ "baby": baby })))
}

// --- Feedings ---

#[derive(Debug, Default, Deserialize)]
pub struct FeedingQuery {
    #[serde(default)]
    pub baby_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

pub async fn create_feeding(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(body): Json<CreateFeedingRequest>,
) -> ApiResult<impl IntoResponse> {
    let feeding = state.services.feeding.create_feeding(user, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "feeding": feeding }))))
}

pub async fn list_feedings(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<FeedingQuery>,
) -> ApiResult<Json<Value>> {
    let baby_id = parse_baby_id(query.baby_id.as_deref())?;
    let range = FeedingRange {
        from: parse_bound(&state.clock, query.start_date.as_deref(), false)?,
        to: parse_bound(&state.clock, query.end_date.as_deref(), true)?,
    };
    let feedings = state.services.feeding.list_feedings(user, baby_id, range).await?;
    Ok(Json(json!({ "feedings": feedings })))
}

pub async fn update_feeding(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(feeding_id): Path<FeedingId>,
    Json(body): Json<UpdateFeedingRequest>,
) -> ApiResult<Json<Value>> {
    let feeding = state.services.feeding.update_feeding(user, feeding_id, body).await?;
    Ok(Json(json!({ "feeding": feeding })))
}

pub async fn delete_feeding(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(feeding_id): Path<FeedingId>,
) -> ApiResult<StatusCode> {
    state.services.feeding.delete_feeding(user, feeding_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn feeding_stats(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<FeedingQuery>,
) -> ApiResult<impl IntoResponse> {
    let baby_id = parse_baby_id(query.baby_id.as_deref())?;
    Ok(Json(state.services.feeding.feeding_stats(user, baby_id).await?))
}

// --- Growth ---

pub async fn upsert_growth(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<GrowthInput>,
) -> ApiResult<Json<Value>> {
    let record = state.services.growth.upsert_record(user, baby_id, body).await?;
    Ok(Json(json!({ "record": record })))
}

pub async fn list_growth(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let records = state.services.growth.list_records(user, baby_id).await?;
    Ok(Json(json!({ "records": records })))
}

pub async fn growth_stats(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.growth.growth_stats(user, baby_id).await?))
}

// --- Settings ---

pub async fn get_settings(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let settings = state.services.settings.get(user, baby_id).await?;
    Ok(Json(json!({ "settings": settings })))
}

pub async fn update_settings(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<SettingsPatch>,
) -> ApiResult<Json<Value>> {
    let settings = state.services.settings.update(user, baby_id, body).await?;
    Ok(Json(json!({ "settings": settings })))
}

pub async fn next_feeding(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.settings.next_feeding_time(user, baby_id).await?))
}

// --- Preferences ---

pub async fn get_preference(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let preference = state.services.preferences.get_preference(user, baby_id).await?;
    Ok(Json(json!({ "preference": preference })))
}

pub async fn update_preference(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<PreferencePatch>,
) -> ApiResult<Json<Value>> {
    let preference = state.services.preferences.update_preference(user, baby_id, body).await?;
    Ok(Json(json!({ "preference": preference })))
}

// --- Formula ---

pub async fn current_formula(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let selection = state.services.formula.current_formula(user, baby_id).await?;
    Ok(Json(json!({ "selection": selection })))
}

pub async fn select_formula(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<FormulaRequest>,
) -> ApiResult<Json<Value>> {
    let selection = state.services.formula.select_formula(user, baby_id, body).await?;
    Ok(Json(json!({ "selection": selection })))
}

// --- Weaning plans ---

/// `{"plan": null}` when nothing is in progress.
pub async fn current_weaning_plan(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
) -> ApiResult<Json<Value>> {
    let plan = state.services.weaning.current_plan(user, baby_id).await?;
    Ok(Json(json!({ "plan": plan })))
}

pub async fn create_weaning_plan(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<CreatePlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let plan = state.services.weaning.create_plan(user, baby_id, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "plan": plan }))))
}

pub async fn update_weaning_plan(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(baby_id): Path<BabyId>,
    Json(body): Json<PlanStatusRequest>,
) -> ApiResult<Json<Value>> {
    let plan = state.services.weaning.update_status(user, baby_id, body).await?;
    Ok(Json(json!({ "plan": plan })))
}

// --- Standards administration ---

#[derive(Debug, Deserialize)]
pub struct ImportStandardBody {
    pub version: String,
    pub standard_type: String,
    #[serde(default)]
    pub month_min: Option<i32>,
    #[serde(default)]
    pub month_max: Option<i32>,
    pub data: Value,
}

pub async fn standard_versions(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let versions = state.services.standards.versions(user).await?;
    Ok(Json(json!({ "versions": versions })))
}

pub async fn import_standard(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(body): Json<ImportStandardBody>,
) -> ApiResult<impl IntoResponse> {
    let entry = StandardEntry {
        id: 0,
        version: body.version,
        standard_type: body.standard_type,
        month_min: body.month_min,
        month_max: body.month_max,
        data: body.data,
        is_active: false,
    };
    let stored = state.services.standards.import_entry(user, entry).await?;
    Ok((StatusCode::CREATED, Json(json!({ "standard": stored }))))
}

pub async fn activate_standard(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(version): Path<String>,
) -> ApiResult<Json<Value>> {
    let activated = state.services.standards.activate_version(user, &version).await?;
    Ok(Json(json!({ "version": version, "activated": activated })))
}
