//! Environment readiness check.

use crate::config::{default_config_path, ScrapeConfig};
use crate::renderer::chromium::{find_chromium, launch_args};
use anyhow::Result;

/// Report browser discovery, configuration, and capture timing.
pub async fn run(config: &ScrapeConfig) -> Result<()> {
    println!("chainscrape doctor");
    println!("==================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium_path = find_chromium(config.browser.chrome_path.as_deref());
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install google-chrome or set CHAINSCRAPE_CHROME_PATH."
        ),
    }
    if let Some(configured) = &config.browser.chrome_path {
        if !configured.exists() {
            println!("[!!] Configured chrome_path does not exist: {}", configured.display());
        }
    }

    match default_config_path() {
        Some(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
        Some(path) => println!("[--] No config file at {} (using defaults)", path.display()),
        None => println!("[??] Could not determine home directory"),
    }

    let timing = &config.timing;
    println!(
        "[OK] Capture wait: {} polls x {}ms, {}ms grace",
        timing.max_polls, timing.poll_interval_ms, timing.grace_ms
    );
    println!("[OK] API page:  {}", config.api_url_template);
    println!("[OK] HTML page: {}", config.html_url_template);
    if !config.html_selects_expiration() {
        println!("     HTML page has no {{expiration}}: api-then-html will not fall back");
    }
    println!("     Browser flags: {}", launch_args(&config.browser).join(" "));

    println!();
    if chromium_path.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}
