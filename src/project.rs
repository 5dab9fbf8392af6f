//! Loads a project snapshot, runs every pass in order and commits the
//! result all at once.

use crate::bootstrap::{self, Bootstrap};
use crate::candidate::RenameTable;
use crate::class_tokens;
use crate::config::Config;
use crate::error::{Result, UpgradeError, Warning};
use crate::graph::{self, ImportGraph, Sheets, normalize_path};
use crate::scanner::{self, ScanGlobOptions};
use crate::stylesheet::Stylesheet;
use crate::{apply, layer, tailwind_directives};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// In-memory snapshot of the files an upgrade reads. Paths are relative to
/// the project root.
#[derive(Debug, Clone)]
pub struct Project {
    root: Option<PathBuf>,
    config: Config,
    entries: Option<Vec<PathBuf>>,
    stylesheets: BTreeMap<PathBuf, String>,
    templates: BTreeMap<PathBuf, String>,
    renames: RenameTable,
    warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub contents: String,
    pub created: bool,
}

/// Outcome of a run: every file whose contents changed, plus warnings for
/// constructs that were left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub changes: Vec<FileChange>,
    pub warnings: Vec<Warning>,
}

impl Project {
    /// Reads the stylesheets reachable from `entries` (or every stylesheet
    /// under `root` when `entries` is empty) and the files selected by the
    /// content globs.
    pub fn load(root: &Path, config: Config, entries: &[String]) -> Result<Self> {
        let explicit: Vec<String> = if entries.is_empty() {
            config.stylesheets.clone()
        } else {
            entries.to_vec()
        };

        let initial: Vec<PathBuf> = if explicit.is_empty() {
            scanner::discover_stylesheets(root, &config.ignore)?
                .into_iter()
                .map(|path| relative_to_root(root, &path))
                .collect()
        } else {
            explicit
                .iter()
                .map(|entry| normalize_path(Path::new(entry)))
                .collect()
        };

        let mut project = Self {
            root: Some(root.to_path_buf()),
            entries: (!explicit.is_empty()).then(|| initial.clone()),
            config,
            stylesheets: BTreeMap::new(),
            templates: BTreeMap::new(),
            renames: RenameTable::legacy(),
            warnings: Vec::new(),
        };
        project.load_stylesheets(root, initial)?;
        project.load_templates(root)?;
        debug!(
            stylesheets = project.stylesheets.len(),
            templates = project.templates.len(),
            "loaded project"
        );
        Ok(project)
    }

    /// A project built from in-memory files. `.css` files are stylesheets,
    /// everything else is scanned for class lists.
    pub fn in_memory<P, S>(config: Config, files: impl IntoIterator<Item = (P, S)>) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let mut stylesheets = BTreeMap::new();
        let mut templates = BTreeMap::new();
        for (path, text) in files {
            let path = path.into();
            if is_stylesheet(&path) {
                stylesheets.insert(path, text.into());
            } else {
                templates.insert(path, text.into());
            }
        }
        let entries = (!config.stylesheets.is_empty()).then(|| {
            config
                .stylesheets
                .iter()
                .map(|entry| normalize_path(Path::new(entry)))
                .collect()
        });
        Self {
            root: None,
            config,
            entries,
            stylesheets,
            templates,
            renames: RenameTable::legacy(),
            warnings: Vec::new(),
        }
    }

    pub fn with_renames(mut self, renames: RenameTable) -> Self {
        self.renames = renames;
        self
    }

    fn load_stylesheets(&mut self, root: &Path, initial: Vec<PathBuf>) -> Result<()> {
        let mut queue: VecDeque<PathBuf> = initial.into();
        while let Some(path) = queue.pop_front() {
            if self.stylesheets.contains_key(&path) {
                continue;
            }
            let full = root.join(&path);
            let text = fs::read_to_string(&full).map_err(|err| UpgradeError::io(&full, err))?;
            let sheet = Stylesheet::parse(path.clone(), &text)?;
            for target in graph::local_imports(&sheet) {
                if self.stylesheets.contains_key(&target) {
                    continue;
                }
                if root.join(&target).is_file() {
                    queue.push_back(target);
                } else {
                    self.warnings.push(Warning {
                        path: path.clone(),
                        message: format!("imported file {} not found", target.display()),
                    });
                }
            }
            self.stylesheets.insert(path, text);
        }
        Ok(())
    }

    fn load_templates(&mut self, root: &Path) -> Result<()> {
        let options = ScanGlobOptions {
            base_path: root.to_path_buf(),
            ..ScanGlobOptions::default()
        };
        let files =
            scanner::scan_globs_with_options(&self.config.content, &self.config.ignore, &options)?;
        for file in files {
            match fs::read_to_string(&file) {
                Ok(text) => {
                    self.templates.insert(relative_to_root(root, &file), text);
                }
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    debug!(path = %file.display(), "skipping non-UTF-8 file");
                }
                Err(err) => return Err(UpgradeError::io(&file, err)),
            }
        }
        Ok(())
    }

    /// Runs every pass over the snapshot. Nothing is written; see
    /// [`Report::commit`].
    pub fn upgrade(&self) -> Result<Report> {
        let mut warnings = self.warnings.clone();
        let mut sheets: Sheets = BTreeMap::new();
        for (path, text) in &self.stylesheets {
            sheets.insert(path.clone(), Stylesheet::parse(path.clone(), text)?);
        }

        let entries = match &self.entries {
            Some(entries) => entries.clone(),
            None => graph::entry_points(&sheets),
        };
        ImportGraph::build(&entries, &sheets)?;

        let bootstrap = Bootstrap {
            theme: self.config.theme_entries(),
            legacy_config: self
                .config
                .legacy_config
                .as_deref()
                .map(|path| normalize_path(Path::new(path))),
        };
        if !bootstrap.is_empty() {
            for sheet in sheets.values_mut() {
                bootstrap::migrate(sheet, &bootstrap);
            }
        }
        for sheet in sheets.values_mut() {
            tailwind_directives::migrate(sheet, &mut warnings);
        }
        for sheet in sheets.values_mut() {
            apply::migrate(sheet, &self.renames);
        }
        for sheet in sheets.values_mut() {
            layer::migrate(sheet, &mut warnings);
        }

        let created: BTreeSet<PathBuf> =
            graph::migrate(&entries, &mut sheets, |path| self.exists(path), &mut warnings)?
                .into_iter()
                .collect();

        let mut changes = Vec::new();
        for (path, sheet) in &sheets {
            let contents = sheet.to_css();
            if created.contains(path) {
                changes.push(FileChange {
                    path: path.clone(),
                    contents,
                    created: true,
                });
            } else if self.stylesheets.get(path) != Some(&contents) {
                changes.push(FileChange {
                    path: path.clone(),
                    contents,
                    created: false,
                });
            }
        }

        for (path, text) in &self.templates {
            let ext = path
                .extension()
                .and_then(|value| value.to_str())
                .map(|value| value.to_ascii_lowercase());
            if let Some(contents) = class_tokens::rewrite(text, ext.as_deref(), &self.renames) {
                debug!(path = %path.display(), "rewrote class tokens");
                changes.push(FileChange {
                    path: path.clone(),
                    contents,
                    created: false,
                });
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        Ok(Report { changes, warnings })
    }

    fn exists(&self, path: &Path) -> bool {
        self.templates.contains_key(path)
            || self
                .root
                .as_ref()
                .is_some_and(|root| root.join(path).exists())
    }
}

impl Report {
    pub fn created(&self) -> usize {
        self.changes.iter().filter(|change| change.created).count()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files changed, {} created, {} warnings",
            self.changes.len() - self.created(),
            self.created(),
            self.warnings.len()
        )
    }

    /// Writes every change under `root`. Each file is first written to a
    /// temporary sibling; only when all of them are staged are they renamed
    /// into place. On failure the staged files are removed and every target
    /// already replaced gets its previous contents back.
    pub fn commit(&self, root: &Path) -> Result<()> {
        let mut staged: Vec<Staged> = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            match stage(root, change) {
                Ok(entry) => staged.push(entry),
                Err(err) => {
                    discard(&staged);
                    return Err(err);
                }
            }
        }

        for (idx, entry) in staged.iter().enumerate() {
            if let Err(err) = fs::rename(&entry.temp, &entry.target) {
                restore(&staged[..idx]);
                discard(&staged[idx..]);
                return Err(UpgradeError::io(&entry.target, err));
            }
        }

        for change in &self.changes {
            if change.created {
                info!(path = %change.path.display(), "created");
            } else {
                info!(path = %change.path.display(), "updated");
            }
        }
        Ok(())
    }
}

/// A change written to its temporary sibling, together with what the target
/// held before.
struct Staged {
    temp: PathBuf,
    target: PathBuf,
    previous: Option<Vec<u8>>,
}

fn stage(root: &Path, change: &FileChange) -> Result<Staged> {
    let target = root.join(&change.path);
    let temp = temp_sibling(&target);
    if temp.exists() {
        return Err(UpgradeError::io(
            &temp,
            io::Error::new(io::ErrorKind::AlreadyExists, "temporary file already exists"),
        ));
    }
    let previous = if target.is_file() {
        Some(fs::read(&target).map_err(|err| UpgradeError::io(&target, err))?)
    } else {
        None
    };
    if let Err(err) = fs::write(&temp, &change.contents) {
        let _ = fs::remove_file(&temp);
        return Err(UpgradeError::io(&temp, err));
    }
    Ok(Staged {
        temp,
        target,
        previous,
    })
}

fn discard(staged: &[Staged]) {
    for entry in staged {
        let _ = fs::remove_file(&entry.temp);
    }
}

fn restore(replaced: &[Staged]) {
    for entry in replaced.iter().rev() {
        let restored = match &entry.previous {
            Some(bytes) => fs::write(&entry.target, bytes),
            None => fs::remove_file(&entry.target),
        };
        if let Err(err) = restored {
            warn!(path = %entry.target.display(), error = %err, "failed to roll back");
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.upgrade-tmp", name))
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
}

fn relative_to_root(root: &Path, path: &Path) -> PathBuf {
    normalize_path(path.strip_prefix(root).unwrap_or(path))
}

#[cfg(test)]
mod tests {
    use super::{FileChange, Project, Report};
    use crate::candidate::RenameTable;
    use crate::config::{self, Config};
    use crate::error::UpgradeError;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn contents<'a>(report: &'a Report, path: &str) -> &'a str {
        report
            .changes
            .iter()
            .find(|change| change.path == Path::new(path))
            .map(|change| change.contents.as_str())
            .unwrap_or_else(|| panic!("{path} should have changed"))
    }

    fn apply(files: &mut BTreeMap<String, String>, report: &Report) {
        for change in &report.changes {
            files.insert(
                change.path.to_string_lossy().to_string(),
                change.contents.clone(),
            );
        }
    }

    #[test]
    fn upgrades_a_legacy_project() {
        let config = config::parse(
            "content = [\"./src/**/*.{html,js}\"]\nlegacy_config = \"tailwind.config.js\"\n",
        )
        .expect("config should parse");
        let project = Project::in_memory(
            config,
            [
                (
                    "src/index.html",
                    "<h1>🤠👋</h1>\n<div class=\"!flex sm:!block bg-gradient-to-t\"></div>\n",
                ),
                (
                    "src/input.css",
                    "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n",
                ),
            ],
        );
        let report = project.upgrade().expect("upgrade should succeed");
        assert_eq!(
            contents(&report, "src/index.html"),
            "<h1>🤠👋</h1>\n<div class=\"flex! sm:block! bg-linear-to-t\"></div>\n"
        );
        assert_eq!(
            contents(&report, "src/input.css"),
            "@import 'tailwindcss';\n@config '../tailwind.config.js';\n"
        );
        assert_eq!(report.created(), 0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn migrates_apply_and_layers_in_one_stylesheet() {
        let project = Project::in_memory(
            Config::default(),
            [(
                "src/index.css",
                "@tailwind base;\n\nhtml {\n  color: #333;\n}\n\n@tailwind components;\n\n.btn {\n  @apply !flex rounded-md;\n}\n\n@tailwind utilities;\n",
            )],
        );
        let report = project.upgrade().expect("upgrade should succeed");
        assert_eq!(
            contents(&report, "src/index.css"),
            "@import 'tailwindcss';\n\n@layer base {\n  html {\n    color: #333;\n  }\n}\n\n@utility btn {\n  @apply flex! rounded-md;\n}\n"
        );
    }

    #[test]
    fn uses_the_injected_rename_table() {
        let project = Project::in_memory(
            Config::default(),
            [
                ("src/index.html", "<div class=\"!flex flex-grow\"></div>\n"),
                ("src/index.css", ".a {\n  @apply !mt-2 outline-none;\n}\n"),
            ],
        )
        .with_renames(RenameTable::empty());
        let report = project.upgrade().expect("upgrade should succeed");
        assert_eq!(
            contents(&report, "src/index.html"),
            "<div class=\"flex! flex-grow\"></div>\n"
        );
        assert_eq!(
            contents(&report, "src/index.css"),
            ".a {\n  @apply mt-2! outline-none;\n}\n"
        );
    }

    fn nested_files() -> BTreeMap<String, String> {
        [
            (
                "src/index.css",
                "@import 'tailwindcss/utilities';\n@import './a.css' layer(utilities);\n@import './b.css' layer(components);\n",
            ),
            (
                "src/a.css",
                "@import './utilities.css';\n\n.foo-from-a {\n  color: red;\n}\n",
            ),
            (
                "src/utilities.css",
                "#foo {\n  --keep: me;\n}\n\n.foo-from-import {\n  color: blue;\n}\n",
            ),
            (
                "src/b.css",
                "@import './components.css';\n\n.bar-from-b {\n  color: red;\n}\n",
            ),
            ("src/components.css", ".bar-from-import {\n  color: blue;\n}\n"),
            ("src/index.html", "<div class=\"hover:thing\"></div>\n"),
        ]
        .into_iter()
        .map(|(path, text)| (path.to_string(), text.to_string()))
        .collect()
    }

    #[test]
    fn splits_imported_utilities_and_reaches_a_fixed_point() {
        let mut files = nested_files();
        let report = Project::in_memory(Config::default(), files.clone())
            .upgrade()
            .expect("upgrade should succeed");

        assert_eq!(
            contents(&report, "src/index.css"),
            "@import 'tailwindcss/utilities' layer(utilities);\n@import './a.css' layer(utilities);\n@import './a.utilities.css';\n@import './b.css';\n"
        );
        assert_eq!(contents(&report, "src/a.css"), "@import './utilities.css';\n");
        assert_eq!(contents(&report, "src/utilities.css"), "#foo {\n  --keep: me;\n}\n");
        assert_eq!(
            contents(&report, "src/a.utilities.css"),
            "@utility foo-from-import {\n  color: blue;\n}\n\n@utility foo-from-a {\n  color: red;\n}\n"
        );
        assert_eq!(contents(&report, "src/components.css"), "");
        assert_eq!(report.created(), 1);
        assert!(!report.changes.iter().any(|change| change.path == Path::new("src/index.html")));

        apply(&mut files, &report);
        let second = Project::in_memory(Config::default(), files)
            .upgrade()
            .expect("second upgrade should succeed");
        assert!(second.is_empty(), "unexpected changes: {:?}", second.changes);
    }

    #[test]
    fn commits_changes_and_respects_dry_runs() {
        let root = temp_dir("upgrade_commit");
        let _ = fs::create_dir_all(root.join("src"));
        let _ = fs::write(
            root.join("src/index.css"),
            "@import 'tailwindcss';\n@import './utilities.css' layer(utilities);\n",
        );
        let _ = fs::write(root.join("src/utilities.css"), ".a {\n  color: red;\n}\n");

        let project = Project::load(&root, Config::default(), &[]).expect("project should load");
        let report = project.upgrade().expect("upgrade should succeed");
        assert_eq!(report.summary(), "2 files changed, 0 created, 0 warnings");
        assert_eq!(
            fs::read_to_string(root.join("src/utilities.css")).expect("read utilities"),
            ".a {\n  color: red;\n}\n"
        );

        report.commit(&root).expect("commit should succeed");
        assert_eq!(
            fs::read_to_string(root.join("src/index.css")).expect("read index"),
            "@import 'tailwindcss';\n@import './utilities.css';\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("src/utilities.css")).expect("read utilities"),
            "@utility a {\n  color: red;\n}\n"
        );
        let leftovers = fs::read_dir(root.join("src"))
            .expect("read src")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".upgrade-tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let _ = fs::remove_dir_all(&root);
    }

    fn change(path: &str, contents: &str, created: bool) -> FileChange {
        FileChange {
            path: PathBuf::from(path),
            contents: contents.to_string(),
            created,
        }
    }

    #[test]
    fn failed_commit_restores_replaced_files() {
        let root = temp_dir("upgrade_rollback");
        let _ = fs::create_dir_all(root.join("locked"));
        let _ = fs::write(root.join("a.css"), "old");
        let _ = fs::write(root.join("locked/keep.css"), "");

        let report = Report {
            changes: vec![
                change("a.css", "new", false),
                change("a.utilities.css", "@utility a {}\n", true),
                change("locked", "new", false),
            ],
            warnings: Vec::new(),
        };
        assert!(report.commit(&root).is_err());
        assert_eq!(fs::read_to_string(root.join("a.css")).expect("read a"), "old");
        assert!(!root.join("a.utilities.css").exists());
        assert!(root.join("locked").is_dir());
        assert!(!root.join(".a.css.upgrade-tmp").exists());
        assert!(!root.join(".locked.upgrade-tmp").exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn commit_refuses_to_overwrite_temporary_files() {
        let root = temp_dir("upgrade_stale_tmp");
        let _ = fs::create_dir_all(&root);
        let _ = fs::write(root.join("a.css"), "old");
        let _ = fs::write(root.join("b.css"), "old");
        let _ = fs::write(root.join(".b.css.upgrade-tmp"), "someone else's");

        let report = Report {
            changes: vec![change("a.css", "new", false), change("b.css", "new", false)],
            warnings: Vec::new(),
        };
        assert!(report.commit(&root).is_err());
        assert_eq!(fs::read_to_string(root.join("a.css")).expect("read a"), "old");
        assert_eq!(fs::read_to_string(root.join("b.css")).expect("read b"), "old");
        assert_eq!(
            fs::read_to_string(root.join(".b.css.upgrade-tmp")).expect("read tmp"),
            "someone else's"
        );
        assert!(!root.join(".a.css.upgrade-tmp").exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn rejects_cyclic_imports_without_writing() {
        let root = temp_dir("upgrade_cycle");
        let _ = fs::create_dir_all(&root);
        let _ = fs::write(root.join("index.css"), "@import './a.css' layer(utilities);\n");
        let _ = fs::write(root.join("a.css"), "@import './b.css';\n.a { color: red; }\n");
        let _ = fs::write(root.join("b.css"), "@import './a.css';\n.b { color: red; }\n");

        let project = Project::load(&root, Config::default(), &["index.css".to_string()])
            .expect("project should load");
        let err = project.upgrade().unwrap_err();
        assert!(matches!(err, UpgradeError::GraphCycle { .. }));
        assert!(err.to_string().contains("a.css -> b.css -> a.css"));
        assert_eq!(
            fs::read_to_string(root.join("a.css")).expect("read a"),
            "@import './b.css';\n.a { color: red; }\n"
        );
        assert!(!root.join("a.utilities.css").exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn reports_parse_errors_with_location() {
        let project = Project::in_memory(Config::default(), [("broken.css", ".a {\n  color: red;\n")]);
        let err = project.upgrade().unwrap_err();
        assert!(matches!(err, UpgradeError::Parse { .. }));
    }

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}", prefix, nanos))
    }
}
