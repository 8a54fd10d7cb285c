use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::lookup_key;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_sections_list(state: &AppState, req: &Request) -> serde_json::Value {
    let sections: Vec<serde_json::Value> = state
        .store
        .sections()
        .iter()
        .map(|s| json!({ "name": s.name(), "studentCount": s.len() }))
        .collect();
    ok(&req.id, json!({ "sections": sections }))
}

fn handle_students_list(state: &AppState, req: &Request) -> serde_json::Value {
    let section = match lookup_key(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.store.list_student_ids(section) {
        Ok(ids) => ok(&req.id, json!({ "section": section, "studentIds": ids })),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_students_locate(state: &AppState, req: &Request) -> serde_json::Value {
    let student_id = match lookup_key(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sections = state.store.locate_student(student_id);
    ok(
        &req.id,
        json!({ "studentId": student_id, "sections": sections }),
    )
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.list" => Some(handle_sections_list(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.locate" => Some(handle_students_locate(state, req)),
        _ => None,
    }
}
