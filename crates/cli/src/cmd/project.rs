use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

use clap::{Arg, ArgAction, ArgMatches, Command};
use luabox_core::manifest::{ArgName, ArgType, ArgValue, ArgValues, CommandArg};
use luabox_core::{CoreError, Project, run_script};
use tracing::debug;

/// Runs a command declared in the project manifest. `args` starts with the command name.
pub fn cmd_project(manifest: &Path, args: Vec<OsString>) -> Result<u8, CoreError> {
    let project = Project::load(manifest)?;
    let matches = parser(&project).get_matches_from(args);

    // A subcommand is required so clap has already exited when there is none.
    let Some((name, matches)) = matches.subcommand() else {
        return Ok(0);
    };

    let Some(def) = project.commands.get(name) else {
        return Ok(0);
    };

    let Some(script) = &def.script else {
        return Err(CoreError::NoCommandAction(name.to_owned()));
    };

    let root = manifest.parent().unwrap_or(Path::new(""));
    let values = arg_values(&def.args, matches);

    debug!(command = name, %script, args = values.len(), "running project command");

    run_script(&script.resolve(root), &project.sandbox, &values)
}

/// Builds the argument parser for the commands in `project`.
fn parser(project: &Project) -> Command {
    let mut parser = Command::new("luabox")
        .no_binary_name(true)
        .subcommand_required(true)
        .disable_help_subcommand(true);

    for (name, def) in &project.commands {
        let mut cmd = Command::new(name.clone()).about(def.description.clone());

        for (id, def) in &def.args {
            cmd = cmd.arg(arg(id, def));
        }

        parser = parser.subcommand(cmd);
    }

    parser
}

fn arg(id: &ArgName, def: &CommandArg) -> Arg {
    let mut arg = Arg::new(id.as_str().to_owned())
        .help(def.description.clone())
        .value_name(
            def.placeholder
                .clone()
                .unwrap_or_else(|| id.to_uppercase()),
        );

    match def.ty {
        ArgType::Bool => arg = arg.action(ArgAction::SetTrue),
        ArgType::String => (),
    }

    if let Some(v) = &def.long {
        arg = arg.long(v.clone());
    }

    if let Some(v) = def.short {
        arg = arg.short(v);
    }

    // Value used when the flag is given without one.
    if let Some(v) = &def.default {
        arg = arg.default_missing_value(v.clone()).num_args(0..=1);
    }

    arg
}

fn arg_values(defs: &BTreeMap<ArgName, CommandArg>, matches: &ArgMatches) -> ArgValues {
    defs.iter()
        .map(|(id, def)| {
            let v = match def.ty {
                ArgType::Bool => ArgValue::Bool(matches.get_flag(id)),
                ArgType::String => ArgValue::String(matches.get_one::<String>(id).cloned()),
            };

            (id.as_str().to_owned(), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn project(yaml: &str) -> Project {
        let mut file = NamedTempFile::new().unwrap();

        file.write_all(yaml.as_bytes()).unwrap();

        Project::load(file.path()).unwrap()
    }

    const MANIFEST: &str = r#"
commands:
  build:
    description: Build the project
    script: build.lua
    args:
      release:
        description: Enable optimizations
        type: bool
        long: release
        short: r
      target:
        description: Target triple
        type: string
        long: target
        default: native
"#;

    #[test]
    fn parses_declared_args() {
        let project = project(MANIFEST);
        let matches = parser(&project).get_matches_from(["build", "-r", "--target", "x86_64"]);
        let (name, matches) = matches.subcommand().unwrap();
        let values = arg_values(&project.commands[name].args, matches);

        assert_eq!(values["release"], ArgValue::Bool(true));
        assert_eq!(values["target"], ArgValue::String(Some("x86_64".into())));
    }

    #[test]
    fn unset_and_defaulted_args() {
        let project = project(MANIFEST);
        let matches = parser(&project).get_matches_from(["build"]);
        let values = arg_values(&project.commands["build"].args, matches.subcommand().unwrap().1);

        assert_eq!(values["release"], ArgValue::Bool(false));
        assert_eq!(values["target"], ArgValue::String(None));

        let matches = parser(&project).get_matches_from(["build", "--target"]);
        let values = arg_values(&project.commands["build"].args, matches.subcommand().unwrap().1);

        assert_eq!(values["target"], ArgValue::String(Some("native".into())));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let project = project(MANIFEST);

        assert!(parser(&project).try_get_matches_from(["deploy"]).is_err());
    }
}
