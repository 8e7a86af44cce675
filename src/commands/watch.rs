use clap::Args;
use farmsync::sync::{FarmMirror, InventoryMirror};

use super::Session;

/// Follows crops and inventory live until interrupted.
#[derive(Args)]
pub struct WatchCommand {}

impl WatchCommand {
    pub async fn run(self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let farm = session.farm();
        let inventory = session.inventory();
        let mut crops = farm.watch();
        let mut items = inventory.watch();

        println!("Watching for changes (Ctrl-C to stop)...");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = crops.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    print_farm(&crops.borrow_and_update());
                }
                changed = items.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    print_inventory(&items.borrow_and_update());
                }
            }
        }

        farm.shutdown().await;
        inventory.shutdown().await;
        Ok(())
    }
}

fn print_farm(mirror: &FarmMirror) {
    if mirror.loading {
        return;
    }
    if let Some(error) = &mirror.error {
        eprintln!("[crops] error: {}", error);
        return;
    }
    let stats = &mirror.summary;
    println!(
        "[crops] {} crop(s), {} acres, water {}, avg yield +{}%",
        stats.total_crops, stats.total_farm_area, stats.total_water_usage, stats.avg_yield_increase
    );
}

fn print_inventory(mirror: &InventoryMirror) {
    if mirror.loading {
        return;
    }
    if let Some(error) = &mirror.error {
        eprintln!("[inventory] error: {}", error);
        return;
    }
    let total: f64 = mirror.records.iter().map(|item| item.quantity).sum();
    println!(
        "[inventory] {} entr(ies), {} unit(s) in storage",
        mirror.records.len(),
        total
    );
}
