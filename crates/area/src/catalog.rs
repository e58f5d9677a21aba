// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `area catalog` command implementation.

use area_core::AreaError;
use area_registry::{BUILTIN_SERVICES, ServiceDef};

pub fn run_catalog(json: bool) -> Result<(), AreaError> {
    if json {
        let rendered = serde_json::to_string_pretty(BUILTIN_SERVICES)
            .map_err(|e| AreaError::Internal(format!("failed to render catalog: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", render_table(BUILTIN_SERVICES));
    }
    Ok(())
}

fn render_table(services: &[ServiceDef]) -> String {
    let mut out = String::new();
    for service in services {
        let oauth = service.oauth_provider.unwrap_or("none");
        out.push_str(&format!(
            "{:>3}  {:<10} {} (oauth: {oauth})\n",
            service.id, service.name, service.display_name
        ));
        for action in service.actions {
            out.push_str(&format!("       action   {:>3}  {:<16} {}\n", action.id, action.key, action.description));
        }
        for reaction in service.reactions {
            out.push_str(&format!(
                "       reaction {:>3}  {:<16} {}\n",
                reaction.id, reaction.key, reaction.description
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_capability() {
        let table = render_table(BUILTIN_SERVICES);
        for service in BUILTIN_SERVICES {
            assert!(table.contains(service.display_name));
            for capability in service.actions.iter().chain(service.reactions) {
                assert!(table.contains(capability.key));
            }
        }
        assert!(table.contains("(oauth: none)"));
    }
}
