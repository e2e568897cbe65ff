//! Versioned file operations for patient claim directories.
//!
//! Each patient directory is a local Git repository (`git2`/libgit2). Every change to a
//! patient's files is written and committed as one unit:
//!
//! - **Atomic multi-file writes**: all files of a change land in a single commit, or none do.
//!   On failure, previous contents are restored and new files and directories are removed.
//! - **Structured commit messages**: `<domain>:<action>: <summary>`, with no patient
//!   identifiers or claim text.
//! - **Audit trail**: claim history is never rewritten; every state change is a commit.
//!
//! All repositories use `refs/heads/main`.

use crate::constants::{COMMIT_AUTHOR_EMAIL, COMMIT_AUTHOR_NAME};
use crate::error::{ClaimError, ClaimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::{LazyLock, Mutex};

const MAIN_REF: &str = "refs/heads/main";

/// What part of the patient directory a commit touches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CommitDomain {
    Patient,
    Claim,
    Tutela,
}

impl CommitDomain {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Claim => "claim",
            Self::Tutela => "tutela",
        }
    }
}

impl fmt::Display for CommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CommitAction {
    Create,
    Update,
}

impl CommitAction {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured commit message.
///
/// Renders as `<domain>:<action>: <summary>`. The summary is a single line and must not
/// contain patient identifiers or claim text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitMessage {
    domain: CommitDomain,
    action: CommitAction,
    summary: String,
}

impl CommitMessage {
    /// # Errors
    ///
    /// Returns `ClaimError::InvalidInput` if the summary is empty or spans several lines.
    pub(crate) fn new(
        domain: CommitDomain,
        action: CommitAction,
        summary: impl AsRef<str>,
    ) -> ClaimResult<Self> {
        let summary = summary.as_ref().trim();
        if summary.is_empty() || summary.contains(['\n', '\r']) {
            return Err(ClaimError::InvalidInput(
                "commit summary must be non-empty and single-line".into(),
            ));
        }
        Ok(Self {
            domain,
            action,
            summary: summary.to_string(),
        })
    }

    pub(crate) fn render(&self) -> String {
        format!("{}:{}: {}", self.domain, self.action, self.summary)
    }
}

/// A file to be written and committed.
#[derive(Debug, Clone)]
pub(crate) struct FileToWrite<'a> {
    /// Path relative to the repository directory.
    pub relative_path: &'a Path,
    pub content: &'a str,
    /// Previous content for rollback. `None` if this is a new file.
    pub old_content: Option<&'a str>,
}

/// Git operations on a repository rooted at `workdir`.
pub(crate) struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    /// Create a new Git repository at `workdir`.
    ///
    /// # Errors
    ///
    /// Returns `ClaimError::GitInit` if initialisation fails or the repository is bare.
    pub(crate) fn init(workdir: &Path) -> ClaimResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(ClaimError::GitInit)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                ClaimError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open the repository at exactly `workdir`, without searching parent directories.
    ///
    /// # Errors
    ///
    /// Returns `ClaimError::GitOpen` if there is no repository there or it is bare.
    pub(crate) fn open(workdir: &Path) -> ClaimResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(ClaimError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                ClaimError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    fn ensure_main_head(&self) -> ClaimResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(ClaimError::GitSetHead)?;
        Ok(())
    }

    /// Commit only the given repo-relative paths.
    ///
    /// Paths containing `..` are rejected.
    pub(crate) fn commit_paths(
        &self,
        message: &CommitMessage,
        relative_paths: &[PathBuf],
    ) -> ClaimResult<git2::Oid> {
        #[cfg(test)]
        {
            let current_id = std::thread::current().id();
            if let Ok(mut guard) = FORCE_COMMIT_ERROR_FOR_THREADS.lock() {
                if guard.remove(&current_id) {
                    return Err(ClaimError::GitCommit(git2::Error::from_str(
                        "forced commit failure (test hook)",
                    )));
                }
            }
        }

        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(ClaimError::GitIndex)?;

        for path in relative_paths {
            let rel = if path.is_absolute() {
                path.strip_prefix(&self.workdir)
                    .map_err(|_| {
                        ClaimError::InvalidInput(
                            "path is outside the repository working directory".into(),
                        )
                    })?
                    .to_path_buf()
            } else {
                path.to_path_buf()
            };

            if rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(ClaimError::InvalidInput(
                    "path must not contain parent directory references (..)".into(),
                ));
            }

            index.add_path(&rel).map_err(ClaimError::GitAdd)?;
        }
        index.write().map_err(ClaimError::GitIndex)?;

        let tree_id = index.write_tree().map_err(ClaimError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(ClaimError::GitFindTree)?;
        let sig = git2::Signature::now(COMMIT_AUTHOR_NAME, COMMIT_AUTHOR_EMAIL)
            .map_err(ClaimError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(
                Some("HEAD"),
                &sig,
                &sig,
                &message.render(),
                &tree,
                &parent_refs,
            )
            .map_err(ClaimError::GitCommit)
    }

    /// Parent list for the next commit: `HEAD` if it exists, empty for an unborn branch.
    fn resolve_head_parents(&self) -> ClaimResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(ClaimError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(ClaimError::GitHead(e)),
        }
    }

    /// Write `files` and commit them in one commit, rolling back on any failure.
    ///
    /// On error, files that existed are restored to `old_content`, new files are removed and
    /// directories created by this call are removed deepest first.
    ///
    /// # Errors
    ///
    /// Returns the first error from opening the repository, creating directories, writing
    /// files or committing.
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        msg: &CommitMessage,
        files: &[FileToWrite],
    ) -> ClaimResult<()> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: ClaimResult<()> = (|| {
            let mut dirs_needed = std::collections::HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                if let Some(parent) = full_path.parent() {
                    let mut current = parent;
                    while current != repo.workdir && !current.exists() {
                        dirs_needed.insert(current.to_path_buf());
                        match current.parent() {
                            Some(p) => current = p,
                            None => break,
                        }
                    }
                }
            }

            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(ClaimError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                let old_content = file.old_content.map(|s| s.to_string());

                write_atomically(&full_path, file.content)?;
                written_files.push((full_path, old_content));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(msg, &paths)?;

            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(write_error) => {
                for (full_path, old_content) in written_files.iter().rev() {
                    match old_content {
                        Some(contents) => {
                            let _ = write_atomically(full_path, contents);
                        }
                        None => {
                            let _ = std::fs::remove_file(full_path);
                        }
                    }
                }
                for dir in created_dirs.iter().rev() {
                    let _ = std::fs::remove_dir(dir);
                }
                Err(write_error)
            }
        }
    }

    /// Initialise a repository in `dir`, commit the initial files, and remove `dir` entirely
    /// if anything fails.
    ///
    /// # Errors
    ///
    /// Returns the initialisation error, or `ClaimError::CleanupAfterInitialiseFailed` if the
    /// directory could not be removed afterwards either.
    pub(crate) fn init_and_commit(
        dir: &Path,
        message: &CommitMessage,
        files: &[FileToWrite],
    ) -> ClaimResult<()> {
        let result: ClaimResult<()> = (|| {
            let _repo = Self::init(dir)?;
            Self::write_and_commit_files(dir, message, files)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(init_error) => {
                if let Err(cleanup_err) = std::fs::remove_dir_all(dir) {
                    return Err(ClaimError::CleanupAfterInitialiseFailed {
                        path: dir.to_path_buf(),
                        init_error: Box::new(init_error),
                        cleanup_error: cleanup_err,
                    });
                }
                Err(init_error)
            }
        }
    }

    /// Number of commits reachable from `HEAD`.
    pub(crate) fn commit_count(&self) -> ClaimResult<usize> {
        let mut walk = self.repo.revwalk().map_err(ClaimError::GitHead)?;
        walk.push_head().map_err(ClaimError::GitHead)?;
        Ok(walk.count())
    }
}

/// Replace `path` with `content` through a sibling temp file and a rename, so readers see
/// either the old file or the new one.
pub(crate) fn write_atomically(path: &Path, content: &str) -> ClaimResult<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content).map_err(ClaimError::FileWrite)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(ClaimError::FileWrite(e));
    }
    Ok(())
}

#[cfg(test)]
static FORCE_COMMIT_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Make the next commit on the current thread fail.
#[cfg(test)]
pub(crate) fn force_commit_failure_on_current_thread() {
    FORCE_COMMIT_ERROR_FOR_THREADS
        .lock()
        .expect("FORCE_COMMIT_ERROR_FOR_THREADS mutex poisoned")
        .insert(std::thread::current().id());
}
