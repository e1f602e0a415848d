//! Build script: render the dbgbridged man page into `OUT_DIR`.
//!
//! Packagers pick the page up from `target/generated-man/<target>/<profile>`
//! as well, mirroring where the rest of the workspace stages manuals.

use std::{env, fs, io, path::Path, path::PathBuf};
use time::{OffsetDateTime, format_description::well_known::Iso8601};

const FALLBACK_DATE: &str = "1970-01-01";

/// Honours `SOURCE_DATE_EPOCH` so rebuilt packages are reproducible.
fn manual_date() -> String {
    let parsed = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .and_then(|date| date.format(&Iso8601::DATE).ok());
    match parsed {
        Some(date) => date,
        None => {
            if env::var_os("SOURCE_DATE_EPOCH").is_some() {
                println!(
                    "cargo:warning=Ignoring unusable SOURCE_DATE_EPOCH; dating the manual {FALLBACK_DATE}"
                );
            }
            FALLBACK_DATE.into()
        }
    }
}

fn render(binary_name: &str, version: &str) -> String {
    let title = binary_name.to_uppercase();
    let date = manual_date();
    format!(
        ".TH \"{title}\" \"1\" \"{date}\" \"{binary_name} {version}\" \"Debugger Bridge\"\n\
.SH NAME\n\
{binary_name} \\- bridge daemon for a blocking command engine\n\
.SH SYNOPSIS\n\
.B {binary_name}\n\
[\\fB\\-\\-daemon\\-socket\\fR \\fIENDPOINT\\fR]\n\
[\\fB\\-\\-backend\\-program\\fR \\fIPATH\\fR]\n\
.SH DESCRIPTION\n\
{binary_name} accepts newline-delimited JSON commands over a Unix domain\n\
socket or TCP and runs them one at a time against a single backend engine,\n\
enforcing a per-command deadline.\n\
.SH ENVIRONMENT\n\
Every option may also be set through a \\fBDBGBRIDGE_\\fR prefixed variable.\n"
    )
}

fn stage(dir: &Path, page_name: &str, contents: &str) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let staging = dir.join(format!("{page_name}.tmp"));
    fs::write(&staging, contents)?;
    fs::rename(&staging, dir.join(page_name))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for variable in ["CARGO_PKG_VERSION", "SOURCE_DATE_EPOCH", "TARGET", "PROFILE"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    let binary_name = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "dbgbridged".into());
    let version = env::var("CARGO_PKG_VERSION")?;
    let page_name = format!("{binary_name}.1");
    let page = render(&binary_name, &version);

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?);
    stage(&out_dir, &page_name, &page)?;

    // OUT_DIR is target/<profile>/build/<crate>-<hash>/out.
    if let Some(target_root) = out_dir.ancestors().nth(4) {
        let target = env::var("TARGET").unwrap_or_else(|_| "unknown-target".into());
        let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown-profile".into());
        let packaged = target_root.join(format!("generated-man/{target}/{profile}"));
        if let Err(error) = stage(&packaged, &page_name, &page) {
            println!(
                "cargo:warning=Failed to stage manual page in {}: {error}",
                packaged.display()
            );
        }
    }
    Ok(())
}
