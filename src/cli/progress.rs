use editloop::contexts::{FileOutcome, GroupError};
use std::time::Instant;

/// Prints one line per patched file and a closing summary
pub struct PatchSummary {
    total: usize,
    succeeded: usize,
    failed: usize,
    rejected: usize,
    start_time: Instant,
}

impl PatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            rejected: 0,
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &FileOutcome, verbose: bool) {
        match &outcome.result {
            Ok(report) => {
                self.succeeded += 1;
                let state = if report.written {
                    "written"
                } else if report.changed() {
                    "not written"
                } else {
                    "unchanged"
                };
                println!(
                    "✓ {}: {} edit(s) applied, {} skipped, {} -> {} lines ({})",
                    report.path,
                    report.applied,
                    report.skipped.len(),
                    report.lines_before,
                    report.lines_after,
                    state
                );
                if verbose {
                    for skipped in &report.skipped {
                        println!("    skipped {}", skipped);
                    }
                    println!("    sha256 {} -> {}", report.sha256_before, report.sha256_after);
                }
            }
            Err(e) => {
                self.failed += 1;
                eprintln!("✗ {}: {}", outcome.path, e);
            }
        }
    }

    pub fn reject(&mut self, error: &GroupError) {
        self.rejected += 1;
        eprintln!("✗ {}", error);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.rejected > 0
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Summary:");
        println!("  Files:     {}", self.total);
        println!("  Patched:   {}", self.succeeded);
        println!("  Failed:    {}", self.failed);
        println!("  Rejected:  {}", self.rejected);
        println!("  Duration:  {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}
