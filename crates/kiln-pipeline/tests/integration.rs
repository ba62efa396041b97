//! End-to-end integration tests for the kiln build pipeline.
//!
//! Each test exercises the full stack: assemble plan -> finalize -> advance
//! through goals -> persist the library -> restore and verify.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use kiln_archive::{
    fields_by_key, required_field, share, Archivable, ArchiveNode, ArchiveSession,
    SharedArchivable, TypeRegistry, Value,
};
use kiln_pipeline::{Action, BuildState, EnvStore, Library};
use kiln_types::{BuildOptions, Configs, KilnError, Result};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn installer_options() -> BuildOptions {
    BuildOptions::for_project("ExampleApp", "/work/example")
}

fn fresh_library(options: BuildOptions) -> Library {
    let env = EnvStore::from_map([("BUILD_HOST".to_string(), "ci-01".to_string())]);
    Library::new(options, Vec::new(), Configs::new(), env)
}

/// Seeds the library from the build options, the way a real setenv step does.
struct SetEnvAction;

#[async_trait]
impl Action for SetEnvAction {
    fn name(&self) -> &str {
        "setenv"
    }

    async fn execute(&self, state: &mut BuildState) -> Result<()> {
        let opts = state.library.options().clone();
        state
            .library
            .set("root_path", opts.root_path.display().to_string());
        state.library.set("cpu", opts.cpu.clone());
        state.library.set("build_number", 0);
        state.library.set("files", Vec::<Value>::new());
        state.library.require(&["root_path", "cpu"])?;
        Ok(())
    }
}

/// Collects the file list a later packaging step consumes.
struct QueryFilesAction;

#[async_trait]
impl Action for QueryFilesAction {
    fn name(&self) -> &str {
        "query_files"
    }

    async fn execute(&self, state: &mut BuildState) -> Result<()> {
        let mut files = state
            .library
            .get("files")?
            .as_list()
            .ok_or_else(|| KilnError::VarType {
                name: "files".into(),
                expected: "list",
            })?
            .to_vec();
        files.push("app.exe".into());
        files.push("app.dll".into());
        state.library.set("files", files);
        Ok(())
    }
}

/// Produces the package path from the collected file list.
struct PackageAction;

#[async_trait]
impl Action for PackageAction {
    fn name(&self) -> &str {
        "package"
    }

    async fn execute(&self, state: &mut BuildState) -> Result<()> {
        let files = state
            .library
            .get("files")?
            .as_list()
            .ok_or_else(|| KilnError::VarType {
                name: "files".into(),
                expected: "list",
            })?;
        if files.is_empty() {
            return Err(KilnError::ActionFailed {
                goal: "package".into(),
                message: "no files to package".into(),
            });
        }
        let out = state.library.options().output_dir.join("example_app.msi");
        state
            .library
            .set("package_path", out.display().to_string());
        state.library.set(
            "media",
            Value::tuple(vec![Value::from("disk1"), Value::Int(1)]),
        );
        Ok(())
    }

    async fn rollback(&self, state: &mut BuildState) -> Result<()> {
        state.library.remove("package_path");
        Ok(())
    }
}

fn installer_state(options: BuildOptions) -> BuildState {
    let mut state = BuildState::new(fresh_library(options));
    state
        .set_goals(vec![
            "setenv".into(),
            "query_files".into(),
            "package".into(),
        ])
        .unwrap();
    state.register_action("setenv", || Box::new(SetEnvAction)).unwrap();
    state
        .register_action("query_files", || Box::new(QueryFilesAction))
        .unwrap();
    state.register_action("package", || Box::new(PackageAction)).unwrap();
    state
}

// ---------------------------------------------------------------------------
// Component — an archivable with a reference-typed field, used by the
// save/load tests below
// ---------------------------------------------------------------------------

const COMPONENT_TAG: &str = "kiln.installer.Component";

struct Component {
    name: String,
    files: Vec<String>,
    requires: Option<SharedArchivable>,
}

impl Archivable for Component {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    fn export(&self, session: &mut ArchiveSession) -> Result<Vec<ArchiveNode>> {
        let files = self.files.iter().map(|f| ArchiveNode::string(f)).collect();
        let mut fields = vec![
            ArchiveNode::string(&self.name).keyed("name"),
            ArchiveNode::list(files).keyed("files"),
        ];
        if let Some(requires) = &self.requires {
            fields.push(ArchiveNode::link(session.id_for(requires)?).keyed("requires"));
        }
        Ok(fields)
    }

    fn bind_link(&mut self, field: &str, target: SharedArchivable) -> Result<()> {
        match field {
            "requires" => {
                self.requires = Some(target);
                Ok(())
            }
            other => Err(KilnError::MalformedArchive(format!(
                "type '{COMPONENT_TAG}' has no link field '{other}'"
            ))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn load_component(
    fields: &[ArchiveNode],
    session: &mut ArchiveSession,
    _types: &TypeRegistry,
) -> Result<SharedArchivable> {
    let map = fields_by_key(fields);
    let name = required_field(&map, "name", COMPONENT_TAG)?
        .as_str()?
        .to_string();
    let files = required_field(&map, "files", COMPONENT_TAG)?
        .items()?
        .iter()
        .map(|node| node.as_str().map(str::to_string))
        .collect::<Result<Vec<_>>>()?;
    let shared = share(Component {
        name,
        files,
        requires: None,
    });
    if let Some(node) = map.get("requires") {
        session.defer_link(shared.clone(), "requires", node.link_target()?)?;
    }
    Ok(shared)
}

fn component_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.register(COMPONENT_TAG, load_component);
    types
}

fn with_component<R>(value: &Value, f: impl FnOnce(&Component) -> R) -> R {
    let shared = value.as_object().expect("value should be an object");
    let guard = shared.lock().unwrap();
    f(guard
        .as_any()
        .downcast_ref::<Component>()
        .expect("object should be a Component"))
}

// ---------------------------------------------------------------------------
// Test 1: a full build runs its goals in order against the shared library
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_build_produces_package_path() {
    let mut state = installer_state(installer_options());
    state.finalize().expect("finalize should pass");
    state
        .run_to_completion()
        .await
        .expect("build should succeed");

    assert!(!state.has_more_goals());
    assert_eq!(state.current_goal(), Some("package"));
    assert_eq!(state.library.get_str("cpu").unwrap(), "x86");
    assert_eq!(
        state.library.get("files").unwrap(),
        &Value::List(vec!["app.exe".into(), "app.dll".into()])
    );
    assert_eq!(
        state.library.get_str("package_path").unwrap(),
        "/work/example/out/example_app.msi"
    );
    // The env store came from the caller, not the process environment.
    assert_eq!(state.library.env().get("build_host").unwrap(), "ci-01");
}

// ---------------------------------------------------------------------------
// Test 2: skipped goals are logged no-ops, not removals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skipped_goal_leaves_the_plan_intact() {
    let options = installer_options().skip("query_files");
    let mut state = installer_state(options);
    state.finalize().expect("finalize should pass");

    state.advance().await.expect("setenv should run");
    state.advance().await.expect("query_files should be skipped");

    // The skip consumed its position in the plan.
    assert_eq!(state.current_goal(), Some("query_files"));
    assert_eq!(
        state.library.get("files").unwrap(),
        &Value::List(vec![]),
        "skipped goal must not have touched the file list"
    );

    // The packaging step now sees an empty file list and fails.
    let err = state.advance().await.unwrap_err();
    assert!(matches!(err, KilnError::ActionFailed { goal, .. } if goal == "package"));
}

// ---------------------------------------------------------------------------
// Test 3: the library round-trips through a file
// ---------------------------------------------------------------------------

#[tokio::test]
async fn library_round_trips_through_archive_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut state = BuildState::new(fresh_library(installer_options()));
    state.library.set(
        "x",
        Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::tuple(vec![Value::from("a"), Value::from("b")]),
        ]),
    );
    state.library.set("cpu", "x64");
    state.save(&path).expect("save should succeed");

    let mut restored = BuildState::new(fresh_library(BuildOptions::default()));
    restored
        .load(
            &path,
            BuildOptions::default(),
            Vec::new(),
            Configs::new(),
            EnvStore::default(),
            &TypeRegistry::new(),
        )
        .expect("load should succeed");

    assert_eq!(
        restored.library.get("x").unwrap(),
        &Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::tuple(vec![Value::from("a"), Value::from("b")]),
        ])
    );
    // The inner tuple stayed a tuple.
    let x = restored.library.get("x").unwrap();
    assert!(x.as_list().unwrap()[2].as_tuple().is_some());
    assert_eq!(restored.library.get_str("cpu").unwrap(), "x64");
}

// ---------------------------------------------------------------------------
// Test 4: mutually linked components survive save/load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn linked_components_survive_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("components.json");

    let runtime = share(Component {
        name: "runtime".into(),
        files: vec!["runtime.dll".into()],
        requires: None,
    });
    let app = share(Component {
        name: "app".into(),
        files: vec!["app.exe".into()],
        requires: None,
    });
    // app requires runtime and runtime requires app, a genuine cycle.
    app.lock()
        .unwrap()
        .as_any_mut()
        .downcast_mut::<Component>()
        .unwrap()
        .requires = Some(runtime.clone());
    runtime
        .lock()
        .unwrap()
        .as_any_mut()
        .downcast_mut::<Component>()
        .unwrap()
        .requires = Some(app.clone());

    let mut state = BuildState::new(fresh_library(installer_options()));
    state.library.set("app", Value::Object(app));
    state.library.set("runtime", Value::Object(runtime));
    state.save(&path).expect("save should succeed");

    let mut restored = BuildState::new(fresh_library(BuildOptions::default()));
    restored
        .load(
            &path,
            installer_options(),
            Vec::new(),
            Configs::new(),
            EnvStore::default(),
            &component_types(),
        )
        .expect("load should succeed");

    let app = restored.library.get("app").unwrap().clone();
    let runtime = restored.library.get("runtime").unwrap().clone();

    with_component(&app, |c| {
        assert_eq!(c.name, "app");
        assert_eq!(c.files, vec!["app.exe"]);
        let requires = c.requires.as_ref().expect("app.requires must be bound");
        assert!(
            Arc::ptr_eq(requires, runtime.as_object().unwrap()),
            "app must require the live runtime instance"
        );
    });
    with_component(&runtime, |c| {
        assert_eq!(c.name, "runtime");
        let requires = c.requires.as_ref().expect("runtime.requires must be bound");
        assert!(
            Arc::ptr_eq(requires, app.as_object().unwrap()),
            "runtime must require the live app instance"
        );
    });
}

// ---------------------------------------------------------------------------
// Test 5: a failed load leaves the target state untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_load_does_not_replace_the_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("components.json");

    let mut source = BuildState::new(fresh_library(installer_options()));
    source.library.set(
        "solo",
        Value::object(Component {
            name: "solo".into(),
            files: vec![],
            requires: None,
        }),
    );
    source.save(&path).expect("save should succeed");

    let mut target = BuildState::new(fresh_library(installer_options()));
    target.library.set("marker", "still here");

    // No registry entry for the component tag: the load must fail whole.
    let err = target
        .load(
            &path,
            installer_options(),
            Vec::new(),
            Configs::new(),
            EnvStore::default(),
            &TypeRegistry::new(),
        )
        .unwrap_err();
    assert!(matches!(err, KilnError::UnknownTypeTag { tag } if tag == COMPONENT_TAG));

    assert_eq!(target.library.get_str("marker").unwrap(), "still here");
    assert!(!target.library.contains("solo"));
}

// ---------------------------------------------------------------------------
// Test 6: rollback is available to callers that catch a failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caller_can_roll_back_a_failed_packaging_step() {
    let mut state = BuildState::new(fresh_library(installer_options()));
    state.library.set("files", Vec::<Value>::new());
    state
        .library
        .set("package_path", "/work/example/out/stale.msi");

    // The scheduler never calls rollback; a caller that catches the failure
    // may compensate explicitly.
    let action = PackageAction;
    let err = action.run(&mut state).await.unwrap_err();
    assert!(matches!(err, KilnError::ActionFailed { .. }));
    action.rollback(&mut state).await.expect("rollback is best-effort");

    assert!(!state.library.contains("package_path"));
}
