use colored::*;

use sondr_core::registry::ModuleRegistry;

use crate::terminal::print;

pub fn list() -> anyhow::Result<()> {
    let mut registry = ModuleRegistry::new();
    for module in sondr_modules::builtin_modules(sondr_modules::DEFAULT_PORTS.to_vec()) {
        registry.register(module)?;
    }

    for (idx, module) in registry.iter().enumerate() {
        let descriptor = module.descriptor();
        print::tree_head(idx, &descriptor.id);

        let requires = join_or_dash(&descriptor.requires);
        let produces = join_or_dash(&descriptor.produces);
        print::as_tree_one_level(vec![
            ("needs".to_string(), requires.normal()),
            ("finds".to_string(), produces.green()),
            ("timeout".to_string(), format!("{:?}", descriptor.timeout).yellow()),
        ]);
    }
    Ok(())
}

fn join_or_dash(set: &std::collections::BTreeSet<String>) -> String {
    if set.is_empty() {
        "-".to_string()
    } else {
        set.iter().cloned().collect::<Vec<String>>().join(", ")
    }
}
