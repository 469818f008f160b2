use crate::output::{print_json, print_table};
use stylist_core::feature::{CommandEntry, CommandOrigin};
use stylist_core::Project;

pub fn run(project: &Project, json: bool) -> anyhow::Result<()> {
    let entries: Vec<CommandEntry> = project
        .list_commands()
        .iter()
        .filter_map(|name| project.get_command(name))
        .collect();

    if json {
        return print_json(&entries);
    }

    let rows = entries
        .into_iter()
        .map(|e| {
            let origin = match e.origin {
                CommandOrigin::Core => "core",
                CommandOrigin::Feature => "feature",
            };
            vec![e.name, origin.to_string(), e.about]
        })
        .collect();
    print_table(&["COMMAND", "ORIGIN", "DESCRIPTION"], rows);
    Ok(())
}
