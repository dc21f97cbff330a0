//! Packet filter commands (`nft`).

use crate::host_command::HostCommand;

/// `nft -f <file>`: load a rule set file atomically.
#[derive(Debug, Clone)]
pub struct NftApply {
    pub path: String,
    /// Only parse the file (`-c`), do not commit
    pub check_only: bool,
}

impl HostCommand for NftApply {
    fn program(&self) -> &'static str {
        "nft"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.check_only {
            args.push("-c".to_string());
        }
        args.push("-f".to_string());
        args.push(self.path.clone());
        args
    }

    /// The check parses a file the same run writes, so it shares the
    /// dry-run gate of that write.
    fn is_mutating(&self) -> bool {
        true
    }
}
