use std::collections::BTreeMap;

/// Commands that may supersede earlier commands with the same key.
pub trait LastWriterWins {
    type Key: Ord + Clone;

    /// `None` for commands that are never collapsed.
    fn lww_key(&self) -> Option<Self::Key>;
}

/// Collects commands during a tick and resolves conflicts deterministically.
#[derive(Debug)]
pub struct CommandStream<C> {
    commands: Vec<C>,
}

/// Resolved command list after LWW conflict resolution.
#[derive(Debug)]
pub struct ResolvedCommands<C> {
    pub commands: Vec<C>,
}

impl<C> Default for CommandStream<C> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<C: LastWriterWins + Clone> CommandStream<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: C) {
        self.commands.push(cmd);
    }

    /// Collapse keyed commands to the last one pushed for each key. The
    /// survivor keeps the position of that last occurrence; unkeyed commands
    /// stay in arrival order.
    pub fn resolve(&self) -> ResolvedCommands<C> {
        let mut last_index: BTreeMap<C::Key, usize> = BTreeMap::new();
        for (i, cmd) in self.commands.iter().enumerate() {
            if let Some(key) = cmd.lww_key() {
                // Last writer wins: later entry overwrites
                last_index.insert(key, i);
            }
        }

        let commands = self
            .commands
            .iter()
            .enumerate()
            .filter(|(i, cmd)| match cmd.lww_key() {
                Some(key) => last_index.get(&key) == Some(i),
                None => true,
            })
            .map(|(_, cmd)| cmd.clone())
            .collect();

        ResolvedCommands { commands }
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestCommand {
        Join(u32),
        Act { user: u32, value: i32 },
        Leave(u32),
    }

    impl LastWriterWins for TestCommand {
        type Key = u32;

        fn lww_key(&self) -> Option<u32> {
            match self {
                TestCommand::Act { user, .. } => Some(*user),
                _ => None,
            }
        }
    }

    #[test]
    fn lww_same_user() {
        let mut stream = CommandStream::new();
        stream.push(TestCommand::Act { user: 1, value: 1 });
        stream.push(TestCommand::Act { user: 1, value: 2 });

        let resolved = stream.resolve();
        assert_eq!(resolved.commands, vec![TestCommand::Act { user: 1, value: 2 }]);
    }

    #[test]
    fn different_users_no_conflict() {
        let mut stream = CommandStream::new();
        stream.push(TestCommand::Act { user: 1, value: 1 });
        stream.push(TestCommand::Act { user: 2, value: 2 });

        let resolved = stream.resolve();
        assert_eq!(resolved.commands.len(), 2);
    }

    #[test]
    fn survivor_keeps_position_of_last_occurrence() {
        let mut stream = CommandStream::new();
        stream.push(TestCommand::Act { user: 1, value: 1 });
        stream.push(TestCommand::Join(2));
        stream.push(TestCommand::Act { user: 1, value: 9 });
        stream.push(TestCommand::Leave(1));

        let resolved = stream.resolve();
        assert_eq!(
            resolved.commands,
            vec![
                TestCommand::Join(2),
                TestCommand::Act { user: 1, value: 9 },
                TestCommand::Leave(1),
            ]
        );
    }

    #[test]
    fn unkeyed_commands_never_collapse() {
        let mut stream = CommandStream::new();
        stream.push(TestCommand::Join(1));
        stream.push(TestCommand::Join(1));
        assert_eq!(stream.resolve().commands.len(), 2);
    }

    #[test]
    fn clear_empties_stream() {
        let mut stream = CommandStream::new();
        stream.push(TestCommand::Join(1));
        assert_eq!(stream.len(), 1);
        stream.clear();
        assert!(stream.is_empty());
    }
}
