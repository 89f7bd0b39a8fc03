//! UGen listing command.

use clap::Args;
use rill_registry::{UGenCategory, UGenRegistry};

#[derive(Args)]
pub struct UgensArgs {
    /// Only list one category (source, math, control, utility)
    #[arg(short, long)]
    category: Option<String>,
}

const CATEGORIES: [UGenCategory; 4] = [
    UGenCategory::Source,
    UGenCategory::Math,
    UGenCategory::Control,
    UGenCategory::Utility,
];

fn parse_category(name: &str) -> anyhow::Result<UGenCategory> {
    CATEGORIES
        .into_iter()
        .find(|c| c.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let known: Vec<&str> = CATEGORIES.iter().map(|c| c.name()).collect();
            anyhow::anyhow!("unknown category '{name}'; expected one of {}", known.join(", "))
        })
}

pub fn run(args: UgensArgs) -> anyhow::Result<()> {
    let registry = UGenRegistry::new();
    let categories = match &args.category {
        Some(name) => vec![parse_category(name)?],
        None => CATEGORIES.to_vec(),
    };

    for category in categories {
        let descriptors = registry.in_category(category);
        if descriptors.is_empty() {
            continue;
        }
        println!("{} - {}", category.name(), category.description());
        for desc in descriptors {
            let ports = if desc.ports.is_empty() {
                "-".to_string()
            } else {
                desc.ports.join(", ")
            };
            println!("  {:<10} {:<22} ports: {}", desc.id, desc.name, ports);
            println!("  {:<10} {}", "", desc.description);
        }
        if category == UGenCategory::Utility {
            // Sinks are built into the graph, not registered.
            println!("  {:<10} {:<22} ports: in", "out", "Output");
            println!("  {:<10} Sums its inputs into output channel args[0]", "");
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("math").unwrap(), UGenCategory::Math);
        assert_eq!(parse_category("SOURCE").unwrap(), UGenCategory::Source);
        assert!(parse_category("reverb").is_err());
    }
}
