use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::lookup_key;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn section_and_student<'a>(req: &'a Request) -> Result<(&'a str, &'a str), serde_json::Value> {
    Ok((lookup_key(req, "section")?, lookup_key(req, "studentId")?))
}

fn to_result<T: serde::Serialize>(req: &Request, value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_scores_totals(state: &AppState, req: &Request) -> serde_json::Value {
    let section = match lookup_key(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.engine().compute_all_totals(section) {
        Ok(totals) => to_result(req, &totals),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_scores_lookup(state: &AppState, req: &Request) -> serde_json::Value {
    let (section, student_id) = match section_and_student(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.engine().lookup(section, student_id) {
        Ok(result) => to_result(req, &result),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_scores_record(state: &AppState, req: &Request) -> serde_json::Value {
    let (section, student_id) = match section_and_student(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.store.get_record(section, student_id) {
        Ok(record) => ok(
            &req.id,
            json!({
                "section": section,
                "studentId": student_id,
                "scores": record,
                "defect": crate::calc::validate_record(record).err(),
            }),
        ),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_ranking_rank(state: &AppState, req: &Request) -> serde_json::Value {
    let (section, student_id) = match section_and_student(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let engine = state.engine();
    let rank = match engine.rank(section, student_id) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, &e),
    };
    let student_count = state
        .store
        .get_section(section)
        .map(|s| s.len())
        .unwrap_or(0);
    ok(
        &req.id,
        json!({
            "section": section,
            "studentId": student_id,
            "rank": rank,
            "studentCount": student_count,
        }),
    )
}

fn handle_stats_get(state: &AppState, req: &Request) -> serde_json::Value {
    let section = match lookup_key(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.engine().aggregate_stats(section) {
        Ok(stats) => to_result(req, &stats),
        Err(e) => calc_err(&req.id, &e),
    }
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.totals" => Some(handle_scores_totals(state, req)),
        "scores.lookup" => Some(handle_scores_lookup(state, req)),
        "scores.record" => Some(handle_scores_record(state, req)),
        "ranking.rank" => Some(handle_ranking_rank(state, req)),
        "stats.get" => Some(handle_stats_get(state, req)),
        _ => None,
    }
}
