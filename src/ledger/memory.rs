//! In-memory branch substrate for protocol tests.
//!
//! Models a remote holding linear histories of a single-directory tree. Any
//! number of [`MemorySubstrate`]s can share one [`MemoryRemote`], standing in
//! for independent processes. Failure injection covers push rejections, rebase
//! conflicts, transport errors and a concurrent writer landing just before our
//! push.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempDir;

use super::entry::contains_line;
use super::substrate::{
    BranchSubstrate, Checkout, PushOutcome, RebaseOutcome, RemoteTip, Result, SubstrateError,
};
use crate::git::CommitIdentity;
use crate::types::Sha;

type Tree = BTreeMap<PathBuf, String>;

#[derive(Debug, Clone)]
struct Commit {
    parent: Option<u64>,
    tree: Tree,
    message: String,
}

/// A failure to inject into the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Reject the push as if the remote had moved.
    RejectPush,
    /// Report a conflict from the rebase.
    ConflictRebase,
    /// Fail the fetch with a transport error.
    FetchUnavailable,
    /// Another writer appends this line to the branch right before our push lands.
    ConcurrentAppend(String),
}

#[derive(Debug, Default)]
struct RemoteState {
    objects: HashMap<u64, Commit>,
    next_id: u64,
    branches: HashMap<String, u64>,
    faults: VecDeque<Fault>,
    always_reject: bool,
    pushes: usize,
    rejected_pushes: usize,
}

impl RemoteState {
    fn store(&mut self, commit: Commit) -> u64 {
        self.next_id += 1;
        self.objects.insert(self.next_id, commit);
        self.next_id
    }

    fn tree_of(&self, id: Option<u64>) -> Tree {
        id.and_then(|id| self.objects.get(&id))
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    fn is_ancestor(&self, ancestor: u64, mut of: Option<u64>) -> bool {
        while let Some(id) = of {
            if id == ancestor {
                return true;
            }
            of = self.objects.get(&id).and_then(|c| c.parent);
        }
        false
    }

    fn take_fault(&mut self, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let pos = self.faults.iter().position(wanted)?;
        self.faults.remove(pos)
    }

    /// Appends `line` to `file` on `branch` as a new commit by someone else.
    fn append_line(&mut self, branch: &str, file: &Path, line: &str) {
        let parent = self.branches.get(branch).copied();
        let mut tree = self.tree_of(parent);
        tree.entry(file.to_path_buf()).or_default().push_str(line);
        let id = self.store(Commit {
            parent,
            tree,
            message: format!("other writer: {}", line.trim_end()),
        });
        self.branches.insert(branch.to_string(), id);
    }
}

/// A shared in-memory remote.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

fn fake_sha(id: u64) -> Sha {
    // Infallible: always 40 lowercase hex characters.
    Sha::parse(format!("{:040x}", id)).unwrap()
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    /// Queues a fault for the next matching call by any client.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Queues `n` push rejections.
    pub fn reject_next_pushes(&self, n: usize) {
        for _ in 0..n {
            self.inject(Fault::RejectPush);
        }
    }

    /// Rejects every push from now on.
    pub fn always_reject(&self) {
        self.lock().always_reject = true;
    }

    /// Seeds `branch` with a commit holding `contents` in `file`.
    pub fn seed(&self, branch: &str, file: &str, contents: &str) {
        let mut state = self.lock();
        let parent = state.branches.get(branch).copied();
        let mut tree = state.tree_of(parent);
        tree.insert(PathBuf::from(file), contents.to_string());
        let id = state.store(Commit {
            parent,
            tree,
            message: "seed".to_string(),
        });
        state.branches.insert(branch.to_string(), id);
    }

    /// Contents of `file` at the tip of `branch`.
    pub fn read_file(&self, branch: &str, file: &str) -> Option<String> {
        let state = self.lock();
        let tip = *state.branches.get(branch)?;
        state.tree_of(Some(tip)).get(Path::new(file)).cloned()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.lock().branches.contains_key(branch)
    }

    /// Number of commits reachable from `branch`.
    pub fn commit_count(&self, branch: &str) -> usize {
        let state = self.lock();
        let mut count = 0;
        let mut cur = state.branches.get(branch).copied();
        while let Some(id) = cur {
            count += 1;
            cur = state.objects.get(&id).and_then(|c| c.parent);
        }
        count
    }

    /// Commit messages on `branch`, oldest first.
    pub fn messages(&self, branch: &str) -> Vec<String> {
        let state = self.lock();
        let mut out = Vec::new();
        let mut cur = state.branches.get(branch).copied();
        while let Some(id) = cur {
            let commit = &state.objects[&id];
            out.push(commit.message.clone());
            cur = commit.parent;
        }
        out.reverse();
        out
    }

    /// Number of push calls received (accepted or rejected).
    pub fn push_attempts(&self) -> usize {
        self.lock().pushes
    }

    pub fn rejected_pushes(&self) -> usize {
        self.lock().rejected_pushes
    }
}

/// One client's checkout of a [`MemoryRemote`].
///
/// The working tree is a real temporary directory so the protocol's file
/// writes go through the same code paths as with git.
#[derive(Debug)]
pub struct MemorySubstrate {
    remote: MemoryRemote,
    worktree: TempDir,
    identity: Option<CommitIdentity>,
    /// Last fetched remote tip per branch.
    fetched: HashMap<String, u64>,
    branch: Option<String>,
    /// Local HEAD commit; `None` on an unborn branch.
    head: Option<u64>,
    index: Tree,
    /// Commits made locally since the last checkout, oldest first.
    local_commits: Vec<u64>,
}

impl MemorySubstrate {
    pub fn new(remote: &MemoryRemote) -> Self {
        MemorySubstrate {
            remote: remote.clone(),
            worktree: TempDir::new().unwrap(),
            identity: None,
            fetched: HashMap::new(),
            branch: None,
            head: None,
            index: Tree::new(),
            local_commits: Vec::new(),
        }
    }

    pub fn identity(&self) -> Option<&CommitIdentity> {
        self.identity.as_ref()
    }

    pub fn pending_commits(&self) -> usize {
        self.local_commits.len()
    }

    fn write_tree(&self, tree: &Tree) -> Result<()> {
        for entry in std::fs::read_dir(self.worktree.path())? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(&path)?;
            }
        }
        for (path, contents) in tree {
            std::fs::write(self.worktree.path().join(path), contents)?;
        }
        Ok(())
    }

    fn head_tree(&self) -> Tree {
        self.remote.lock().tree_of(self.head)
    }

    fn current_branch(&self) -> Result<String> {
        self.branch
            .clone()
            .ok_or_else(|| SubstrateError::Unavailable("no branch checked out".to_string()))
    }
}

impl BranchSubstrate for MemorySubstrate {
    fn worktree(&self) -> &Path {
        self.worktree.path()
    }

    fn establish_identity(&mut self, identity: &CommitIdentity) -> Result<()> {
        identity.validate()?;
        self.identity = Some(identity.clone());
        Ok(())
    }

    fn fetch(&mut self, branch: &str) -> Result<RemoteTip> {
        let mut state = self.remote.lock();
        if state
            .take_fault(|f| *f == Fault::FetchUnavailable)
            .is_some()
        {
            return Err(SubstrateError::Unavailable(
                "could not read from remote repository".to_string(),
            ));
        }
        match state.branches.get(branch).copied() {
            Some(tip) => {
                self.fetched.insert(branch.to_string(), tip);
                Ok(RemoteTip::Present(fake_sha(tip)))
            }
            None => {
                self.fetched.remove(branch);
                Ok(RemoteTip::Missing)
            }
        }
    }

    fn checkout_or_create(&mut self, branch: &str) -> Result<Checkout> {
        self.branch = Some(branch.to_string());
        self.local_commits.clear();
        self.head = self.fetched.get(branch).copied();
        self.index = self.head_tree();
        self.write_tree(&self.index.clone())?;
        Ok(if self.head.is_some() {
            Checkout::Tracking
        } else {
            Checkout::Bootstrapped
        })
    }

    fn stage_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(self.worktree.path().join(path))?;
        self.index.insert(path.to_path_buf(), contents);
        Ok(())
    }

    fn has_staged_changes(&mut self) -> Result<bool> {
        Ok(self.index != self.head_tree())
    }

    fn commit(&mut self, message: &str) -> Result<()> {
        if self.identity.is_none() {
            return Err(SubstrateError::Unavailable(
                "committer identity unknown".to_string(),
            ));
        }
        let id = self.remote.lock().store(Commit {
            parent: self.head,
            tree: self.index.clone(),
            message: message.to_string(),
        });
        self.head = Some(id);
        self.local_commits.push(id);
        Ok(())
    }

    fn rebase_onto_remote(&mut self, branch: &str) -> Result<RebaseOutcome> {
        if self
            .remote
            .lock()
            .take_fault(|f| *f == Fault::ConflictRebase)
            .is_some()
        {
            return Ok(RebaseOutcome::Conflict);
        }

        let upstream = match self.fetch(branch)? {
            RemoteTip::Present(_) => self.fetched[branch],
            RemoteTip::Missing => return Ok(RebaseOutcome::NoUpstream),
        };

        let mut state = self.remote.lock();
        if state.is_ancestor(upstream, self.head) {
            return Ok(RebaseOutcome::Rebased);
        }

        // Replay each local commit's appended lines onto the upstream tree.
        // Lines already present upstream are dropped; a commit that becomes
        // empty is dropped. Divergent appends to the same file conflict, as
        // they would with git.
        let first_parent = match self.local_commits.first() {
            Some(id) => state.objects.get(id).and_then(|c| c.parent),
            None => self.head,
        };
        let mut base_tree = state.tree_of(first_parent);
        let mut new_head = upstream;
        let mut replayed = Vec::new();
        for &id in &self.local_commits {
            let commit = state.objects[&id].clone();
            let onto = state.tree_of(Some(new_head));
            let mut tree = onto.clone();
            for (path, contents) in &commit.tree {
                let before = base_tree.get(path).cloned().unwrap_or_default();
                let Some(added) = contents.strip_prefix(before.as_str()) else {
                    return Ok(RebaseOutcome::Conflict);
                };
                let theirs = onto.get(path).cloned().unwrap_or_default();
                let missing: String = added
                    .split_inclusive('\n')
                    .filter(|l| !contains_line(&theirs, l))
                    .collect();
                if missing.is_empty() {
                    continue;
                }
                if theirs != before {
                    return Ok(RebaseOutcome::Conflict);
                }
                tree.insert(path.clone(), format!("{}{}", theirs, missing));
            }
            base_tree = commit.tree.clone();
            if tree != onto {
                new_head = state.store(Commit {
                    parent: Some(new_head),
                    tree,
                    message: commit.message.clone(),
                });
                replayed.push(new_head);
            }
        }
        drop(state);

        self.head = Some(new_head);
        self.local_commits = replayed;
        self.index = self.head_tree();
        self.write_tree(&self.index.clone())?;
        Ok(RebaseOutcome::Rebased)
    }

    fn push(&mut self, branch: &str) -> Result<PushOutcome> {
        let mut state = self.remote.lock();
        state.pushes += 1;

        if let Some(Fault::ConcurrentAppend(line)) =
            state.take_fault(|f| matches!(f, Fault::ConcurrentAppend(_)))
        {
            let file = self
                .index
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| PathBuf::from("ledger.log"));
            state.append_line(branch, &file, &line);
        }

        if state.always_reject || state.take_fault(|f| *f == Fault::RejectPush).is_some() {
            state.rejected_pushes += 1;
            return Ok(PushOutcome::Rejected {
                details: "! [rejected] (fetch first)".to_string(),
            });
        }

        let Some(head) = self.head else {
            return Err(SubstrateError::Unavailable(
                "src refspec does not match any".to_string(),
            ));
        };
        match state.branches.get(branch).copied() {
            Some(tip) if tip == head => Ok(PushOutcome::UpToDate),
            Some(tip) if !state.is_ancestor(tip, Some(head)) => {
                state.rejected_pushes += 1;
                Ok(PushOutcome::Rejected {
                    details: "! [rejected] (non-fast-forward)".to_string(),
                })
            }
            _ => {
                state.branches.insert(branch.to_string(), head);
                drop(state);
                self.fetched.insert(branch.to_string(), head);
                self.local_commits.clear();
                Ok(PushOutcome::Pushed)
            }
        }
    }

    fn reset_hard(&mut self) -> Result<()> {
        let branch = self.current_branch()?;
        self.head = self.fetched.get(&branch).copied();
        self.local_commits.clear();
        self.index = self.head_tree();
        self.write_tree(&self.index.clone())
    }

    fn clean_working_tree(&mut self) -> Result<()> {
        for entry in std::fs::read_dir(self.worktree.path())? {
            let path = entry?.path();
            let relative = path.strip_prefix(self.worktree.path()).unwrap_or(&path);
            if path.is_file() && !self.index.contains_key(relative) {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(remote: &MemoryRemote) -> MemorySubstrate {
        let mut s = MemorySubstrate::new(remote);
        s.establish_identity(&CommitIdentity::default()).unwrap();
        s
    }

    fn commit_line(s: &mut MemorySubstrate, line: &str) {
        let path = s.worktree().join("ledger.log");
        let mut contents = std::fs::read_to_string(&path).unwrap_or_default();
        contents.push_str(line);
        std::fs::write(&path, contents).unwrap();
        s.stage_file(Path::new("ledger.log")).unwrap();
        s.commit(line.trim()).unwrap();
    }

    #[test]
    fn divergent_appends_conflict() {
        let remote = MemoryRemote::new();
        remote.seed("b", "ledger.log", "base\n");
        let mut a = client(&remote);
        let mut b = client(&remote);
        for s in [&mut a, &mut b] {
            s.fetch("b").unwrap();
            s.checkout_or_create("b").unwrap();
        }

        commit_line(&mut a, "a\n");
        commit_line(&mut b, "b\n");
        assert_eq!(a.push("b").unwrap(), PushOutcome::Pushed);
        assert!(matches!(b.push("b").unwrap(), PushOutcome::Rejected { .. }));
        assert_eq!(b.rebase_onto_remote("b").unwrap(), RebaseOutcome::Conflict);
    }

    #[test]
    fn identical_append_is_dropped_on_rebase() {
        let remote = MemoryRemote::new();
        remote.seed("b", "ledger.log", "base\n");
        let mut a = client(&remote);
        let mut b = client(&remote);
        for s in [&mut a, &mut b] {
            s.fetch("b").unwrap();
            s.checkout_or_create("b").unwrap();
        }

        commit_line(&mut a, "same\n");
        commit_line(&mut b, "same\n");
        a.push("b").unwrap();

        assert_eq!(b.rebase_onto_remote("b").unwrap(), RebaseOutcome::Rebased);
        assert_eq!(b.pending_commits(), 0);
        assert_eq!(b.push("b").unwrap(), PushOutcome::UpToDate);
        assert_eq!(remote.read_file("b", "ledger.log").unwrap(), "base\nsame\n");
    }

    #[test]
    fn reset_discards_local_commits() {
        let remote = MemoryRemote::new();
        remote.seed("b", "ledger.log", "base\n");
        let mut s = client(&remote);
        s.fetch("b").unwrap();
        s.checkout_or_create("b").unwrap();
        commit_line(&mut s, "local\n");
        std::fs::write(s.worktree().join("stray"), "x").unwrap();

        s.reset_hard().unwrap();
        s.clean_working_tree().unwrap();

        assert_eq!(s.pending_commits(), 0);
        assert!(!s.has_staged_changes().unwrap());
        assert!(!s.worktree().join("stray").exists());
        assert_eq!(
            std::fs::read_to_string(s.worktree().join("ledger.log")).unwrap(),
            "base\n"
        );
    }

    #[test]
    fn concurrent_append_lands_before_push() {
        let remote = MemoryRemote::new();
        remote.seed("b", "ledger.log", "base\n");
        let mut s = client(&remote);
        s.fetch("b").unwrap();
        s.checkout_or_create("b").unwrap();
        commit_line(&mut s, "mine\n");

        remote.inject(Fault::ConcurrentAppend("theirs\n".to_string()));

        assert!(matches!(s.push("b").unwrap(), PushOutcome::Rejected { .. }));
        assert_eq!(
            remote.read_file("b", "ledger.log").unwrap(),
            "base\ntheirs\n"
        );
    }
}
