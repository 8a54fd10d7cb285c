use crate::export::{self, BundleSection};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{lookup_key, optional_bool, optional_path, required_path};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_leaderboard_get(state: &AppState, req: &Request) -> serde_json::Value {
    let section = match lookup_key(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.engine().leaderboard(section) {
        Ok(rows) => ok(&req.id, json!({ "section": section, "rows": rows })),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_leaderboard_export_csv(state: &AppState, req: &Request) -> serde_json::Value {
    let section = match lookup_key(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let out_path = match optional_path(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let bom = match optional_bool(req, "bom", false) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let rows = match state.engine().leaderboard(section) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, &e),
    };
    let csv = export::leaderboard_to_csv(&rows, bom);

    let Some(out_path) = out_path else {
        return ok(
            &req.id,
            json!({ "section": section, "rowsExported": rows.len(), "csv": csv }),
        );
    };
    if let Err(e) = export::write_text_file(&PathBuf::from(&out_path), &csv) {
        return err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        );
    }
    info!(section, path = %out_path, rows = rows.len(), "exported leaderboard csv");
    ok(
        &req.id,
        json!({ "section": section, "rowsExported": rows.len(), "path": out_path }),
    )
}

fn handle_leaderboard_export_bundle(state: &AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_path(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let engine = state.engine();
    let names = state.store.list_sections();
    let mut sections = Vec::with_capacity(names.len());
    for name in names {
        match engine.leaderboard(name) {
            Ok(rows) => sections.push(BundleSection {
                name: name.to_string(),
                rows,
            }),
            Err(e) => return calc_err(&req.id, &e),
        }
    }

    match export::export_leaderboard_bundle(
        &PathBuf::from(&out_path),
        state.store.digest(),
        &sections,
    ) {
        Ok(summary) => {
            info!(path = %out_path, sections = summary.section_count, "exported leaderboard bundle");
            ok(
                &req.id,
                json!({
                    "path": out_path,
                    "bundleFormat": summary.bundle_format,
                    "sectionCount": summary.section_count,
                    "entryCount": summary.entry_count,
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

fn handle_leaderboard_verify_bundle(state: &AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_path(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let bundle = match export::read_leaderboard_bundle(&PathBuf::from(&in_path)) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_bundle",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            )
        }
    };
    let sections: Vec<serde_json::Value> = bundle
        .sections
        .iter()
        .map(|s| json!({ "name": s.name, "rowCount": s.rows.len() }))
        .collect();
    ok(
        &req.id,
        json!({
            "path": in_path,
            "exportedAt": bundle.exported_at,
            "datasetDigest": bundle.dataset_digest,
            "matchesLoadedDataset": bundle.dataset_digest == state.store.digest(),
            "sections": sections,
        }),
    )
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "leaderboard.get" => Some(handle_leaderboard_get(state, req)),
        "leaderboard.exportCsv" => Some(handle_leaderboard_export_csv(state, req)),
        "leaderboard.exportBundle" => Some(handle_leaderboard_export_bundle(state, req)),
        "leaderboard.verifyBundle" => Some(handle_leaderboard_verify_bundle(state, req)),
        _ => None,
    }
}
