#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
        arg_key: "mode",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
        arg_key: "model",
    },
    CommandSpec {
        command: "ratio",
        action: "set_ratio",
        arg_key: "ratio",
    },
    CommandSpec {
        command: "style",
        action: "set_style",
        arg_key: "style",
    },
    CommandSpec {
        command: "detach",
        action: "detach",
        arg_key: "id",
    },
    CommandSpec {
        command: "reuse",
        action: "reuse",
        arg_key: "id",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "export",
    action: "export",
    arg_key: "path",
}];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "attach",
    action: "attach",
    arg_key: "paths",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "models",
        action: "list_models",
        arg_key: "",
    },
    CommandSpec {
        command: "styles",
        action: "list_styles",
        arg_key: "",
    },
    CommandSpec {
        command: "send",
        action: "send_composer",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode",
    "/model",
    "/models",
    "/ratio",
    "/style",
    "/styles",
    "/attach",
    "/detach",
    "/reuse",
    "/send",
    "/export",
    "/quit",
];
