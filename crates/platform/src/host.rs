//! Host machine summary
//!
//! Collects the information printed at the top of a merged benchmark report:
//! OS, CPU model, core count, memory, and who ran the build.

use sysinfo::System;

use crate::Target;

/// A snapshot of the machine a build or benchmark ran on.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub target: Target,
    pub os_name: String,
    pub kernel: String,
    pub cpu: String,
    pub cores: usize,
    pub ram_gb: u64,
    pub hostname: String,
    pub username: String,
}

impl HostInfo {
    /// Gather current host information.
    pub fn collect() -> Self {
        let sys = System::new_all();

        let cpu = sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            target: Target::current(),
            os_name: System::name().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            cpu,
            cores: sys.cpus().len(),
            ram_gb: sys.total_memory() / (1024 * 1024 * 1024),
            hostname: whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string()),
            username: whoami::username(),
        }
    }

    /// Render the banner block used as the header of a merged report.
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        format!(
            "Machine Configuration\n{rule}\n\
             Target  : {}\n\
             OS      : {}\n\
             Kernel  : {}\n\
             CPU     : {}\n\
             Cores   : {}\n\
             RAM     : {} GB\n\
             Host    : {}\n\
             User    : {}\n{rule}",
            self.target,
            self.os_name,
            self.kernel,
            self.cpu,
            self.cores,
            self.ram_gb,
            self.hostname,
            self.username,
        )
    }
}
