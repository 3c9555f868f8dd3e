//! Terminal report rendering
//!
//! Renders the result map's snapshots as a grouped, color-coded report and
//! keeps rewriting a live terminal region with it while the scan runs.

use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::net::IpAddr;

use colored::Colorize;
use crossterm::{cursor, terminal, QueueableCommand};

use crate::dig::NamedAddressSet;
use crate::types::Quality;

pub mod spinner;

pub use spinner::Spinner;

/// Renders named+qualified address snapshots into report frames.
pub struct Renderer {
    pub indentation: usize,
    center_name: String,
    spinner: Spinner,
}

impl Renderer {
    pub fn new(center_name: impl Into<String>, indentation: usize, spinner: Spinner) -> Self {
        Self {
            indentation,
            center_name: center_name.into(),
            spinner,
        }
    }

    /// Stops the spinner's background ticker.
    pub fn stop(&mut self) {
        self.spinner.stop();
    }

    /// Renders one report frame for the given snapshot.
    pub fn render(&self, snapshot: Vec<NamedAddressSet>) -> String {
        let mut out = String::new();
        let groups = group_names(snapshot);
        if groups.is_empty() {
            let _ = writeln!(
                out,
                "inspecting container {} and its networks...",
                self.center_name
            );
            return out;
        }

        // align the address columns across groups
        let labelwidth = groups
            .iter()
            .flatten()
            .map(|set| set.fqdn.trim_end_matches('.').len())
            .max()
            .unwrap_or(0);

        let _ = write!(out, "networks attached to container {}:", self.center_name);
        for group in &groups {
            let name = group_name(&group[0].fqdn);
            if !name.is_empty() {
                let _ = write!(out, " {}", name.bold());
            }
        }
        out.push('\n');

        for group in &groups {
            match group_name(&group[0].fqdn) {
                name if name.is_empty() => {
                    let _ = writeln!(
                        out,
                        "DNS names for containers/services on any attached network"
                    );
                }
                name => {
                    let _ = writeln!(
                        out,
                        "DNS names for containers/services on network {}",
                        name.bold()
                    );
                }
            }
            for set in group {
                self.render_row(&mut out, labelwidth, set);
            }
        }
        out
    }

    fn render_row(&self, out: &mut String, labelwidth: usize, set: &NamedAddressSet) {
        let _ = write!(
            out,
            "{:indent$}{:labelwidth$}",
            "",
            set.fqdn.trim_end_matches('.'),
            indent = self.indentation,
        );
        for (idx, addr) in set.addresses.iter().enumerate() {
            if idx > 0 {
                out.push(' ');
            }
            match addr.quality {
                Quality::Unverified => {
                    let _ = write!(out, " ? {}", addr.address);
                }
                Quality::Verifying => {
                    let styled = format!(" {} {} ", self.spinner.glyph(), addr.address).yellow();
                    let _ = write!(out, "{styled}");
                }
                Quality::Verified => {
                    let styled = format!(" ✔ {} ", addr.address).green();
                    let _ = write!(out, "{styled}");
                }
                Quality::Invalid => {
                    let styled = format!(" × {} ", addr.address).red();
                    let _ = write!(out, "{styled}");
                }
            }
        }
        out.push('\n');
    }
}

/// Rewrites a region of the terminal in place, frame by frame.
#[derive(Debug, Default)]
pub struct LiveWriter {
    lines: u16,
}

impl LiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the previously written frame with the given one.
    pub fn update(&mut self, frame: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        if self.lines > 0 {
            stdout.queue(cursor::MoveUp(self.lines))?;
            stdout.queue(terminal::Clear(terminal::ClearType::FromCursorDown))?;
        }
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
        self.lines = frame.matches('\n').count() as u16;
        Ok(())
    }
}

/// The group label of an FQDN and its container/service label. A single
/// label means a short name: those group under "".
fn group_and_label(fqdn: &str) -> (&str, &str) {
    let trimmed = fqdn.trim_end_matches('.');
    let mut parts = trimmed.splitn(3, '.');
    let label = parts.next().unwrap_or("");
    match parts.next() {
        Some(group) if !group.is_empty() => (group, label),
        _ => ("", label),
    }
}

fn group_name(fqdn: &str) -> &str {
    group_and_label(fqdn).0
}

/// Sorts addresses IPv4 before IPv6, and by byte-wise address value within
/// each family; unparseable literals go last.
fn sort_addresses(sets: &mut NamedAddressSet) {
    sets.addresses.sort_by_key(|qa| match qa.address.parse() {
        Ok(IpAddr::V4(v4)) => (0u8, v4.octets().to_vec()),
        Ok(IpAddr::V6(v6)) => (1u8, v6.octets().to_vec()),
        Err(_) => (2u8, qa.address.clone().into_bytes()),
    });
}

/// Sorts the snapshot by (network group, label) and chops it into per-group
/// runs; the unsuffixed short names come first as group "".
fn group_names(mut snapshot: Vec<NamedAddressSet>) -> Vec<Vec<NamedAddressSet>> {
    snapshot.sort_by(|a, b| group_and_label(&a.fqdn).cmp(&group_and_label(&b.fqdn)));
    let mut groups: Vec<Vec<NamedAddressSet>> = Vec::new();
    for mut set in snapshot {
        sort_addresses(&mut set);
        match groups.last_mut() {
            Some(group) if group_name(&group[0].fqdn) == group_name(&set.fqdn) => {
                group.push(set);
            }
            _ => groups.push(vec![set]),
        }
    }
    groups
}
