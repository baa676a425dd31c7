//! `datalyst tools`: list the tools offered to the model.

use datalyst_config::AppConfig;
use datalyst_core::provider::ToolDefinition;

pub fn run(config: &AppConfig) {
    let registry = datalyst_tools::default_registry(&config.tools);

    println!("Tools ({}):", registry.len());
    for def in registry.definitions() {
        println!();
        println!("  {}({})", def.name, required_arguments(&def).join(", "));
        println!("    {}", def.description);
    }
}

fn required_arguments(def: &ToolDefinition) -> Vec<&str> {
    def.parameters["required"]
        .as_array()
        .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
        .unwrap_or_default()
}
