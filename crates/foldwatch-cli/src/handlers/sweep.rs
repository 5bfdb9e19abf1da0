use std::path::Path;

use anyhow::Result;
use foldwatch_runtime::sweep_once;

use crate::context::RuntimeContext;

pub fn handle(data_dir: &Path, workers: usize) -> Result<()> {
    let ctx = RuntimeContext::build(data_dir)?;
    if ctx.registry.handles().is_empty() {
        println!("No file-based clients configured; nothing to sweep.");
        return Ok(());
    }

    sweep_once(&ctx.registry, workers);

    for identity in ctx.registry.list() {
        let Some(handle) = ctx.registry.get(&identity.name) else {
            continue;
        };
        match handle.coordinator.state() {
            Some(state) => {
                let unit_line = match state.slots.current_unit() {
                    Some(unit) => {
                        let frame_time = unit
                            .frame_time_secs()
                            .map(|secs| format!("{secs}s/frame"))
                            .unwrap_or_else(|| "no frame times".to_string());
                        format!(
                            "{} frames {}/{} ({frame_time})",
                            unit.project,
                            unit.frames_completed(),
                            unit.frames_expected,
                        )
                    }
                    None => "no running unit".to_string(),
                };
                println!("{:<20} {:<22?} {unit_line}", identity.name, state.status);
            }
            None => println!("{:<20} retrieval failed; see log output", identity.name),
        }
    }
    Ok(())
}
