//! Table rendering for list-style commands.

use std::time::{SystemTime, UNIX_EPOCH};

use comfy_table::{presets, Table};

use crate::progress::human_size;
use crate::runner::{reference, BackendStatus, DiskUsage, Model};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(header);
    table
}

/// Rough relative timestamp for table display.
fn human_duration_since(created_unix: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0);
    let seconds = (now - created_unix).max(0);
    if seconds < 60 {
        format!("{seconds} seconds ago")
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{} hours ago", seconds / 3600)
    } else {
        format!("{} days ago", seconds / 86_400)
    }
}

pub fn models_table(models: &[Model]) -> String {
    let mut table = new_table(vec![
        "MODEL NAME",
        "PARAMETERS",
        "QUANTIZATION",
        "ARCHITECTURE",
        "MODEL ID",
        "CREATED",
        "SIZE",
    ]);
    for model in models {
        let id = reference::short_id(&model.id).to_string();
        let created = human_duration_since(model.created);
        if model.tags.is_empty() {
            table.add_row(vec![
                "<none>".to_string(),
                model.config.parameters.clone(),
                model.config.quantization.clone(),
                model.config.architecture.clone(),
                id.clone(),
                created.clone(),
                model.config.size.clone(),
            ]);
        }
        for tag in &model.tags {
            table.add_row(vec![
                tag.clone(),
                model.config.parameters.clone(),
                model.config.quantization.clone(),
                model.config.architecture.clone(),
                id.clone(),
                created.clone(),
                model.config.size.clone(),
            ]);
        }
    }
    table.to_string()
}

pub fn ps_table(statuses: &[BackendStatus]) -> String {
    let mut table = new_table(vec!["MODEL NAME", "BACKEND", "MODE", "LAST USED"]);
    for status in statuses {
        table.add_row(vec![
            status.model_name.clone(),
            status.backend_name.clone(),
            status.mode.clone(),
            status.last_used.clone().unwrap_or_default(),
        ]);
    }
    table.to_string()
}

pub fn df_table(usage: DiskUsage) -> String {
    let mut table = new_table(vec!["TYPE", "SIZE"]);
    table.add_row(vec![
        "Models".to_string(),
        human_size(usage.models_disk_usage.max(0) as f64),
    ]);
    table.add_row(vec![
        "Default backend".to_string(),
        human_size(usage.default_backend_disk_usage.max(0) as f64),
    ]);
    table.to_string()
}
