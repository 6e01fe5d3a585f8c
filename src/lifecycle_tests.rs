#[cfg(test)]
mod tests {
    use crate::codegen::{generate_main_code, main_module_path, WriteOutcome};
    use crate::config::{ProjectConfig, CONFIG_FILE};
    use crate::hooks::{Compilation, PluginError, PluginModule, PluginRegistry};
    use crate::lifecycle::{BuildEvent, LifecycleError, LifecycleState, UVuePlugin};
    use crate::loader::ModuleSource;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PluginModule for Recorder {
        async fn webpack_emit(
            &self,
            _compilation: &mut Compilation,
            _options: &Value,
        ) -> Result<(), PluginError> {
            self.log.lock().unwrap().push(format!("emit:{}", self.name));
            Ok(())
        }

        async fn webpack_after_emit(
            &self,
            _compilation: &mut Compilation,
            _options: &Value,
        ) -> Result<(), PluginError> {
            self.log.lock().unwrap().push(format!("afterEmit:{}", self.name));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl PluginModule for Failing {
        async fn webpack_after_emit(
            &self,
            _compilation: &mut Compilation,
            _options: &Value,
        ) -> Result<(), PluginError> {
            Err(PluginError::Failed("disk full".to_string()))
        }
    }

    fn write_config(root: &Path, json: &str) {
        fs::write(root.join(CONFIG_FILE), json).unwrap();
    }

    fn read_main(root: &Path) -> String {
        let config = ProjectConfig::load(root).unwrap();
        fs::read_to_string(main_module_path(&config)).unwrap()
    }

    #[tokio::test]
    async fn test_run_generates_main_module() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{ "imports": ["@/plugins/http"] }"#);

        let mut plugin = UVuePlugin::new(dir.path(), PluginRegistry::new());
        plugin.handle(BuildEvent::Run).await.unwrap();

        let expected = generate_main_code(&ProjectConfig::load(dir.path()).unwrap());
        assert_eq!(read_main(dir.path()), expected);
        assert!(expected.contains("export { createApp };"));
        assert_eq!(plugin.state(), LifecycleState::Idle);
        assert!(!plugin.is_watching());

        assert_eq!(plugin.write_main().await.unwrap(), WriteOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_run_picks_up_config_edits() {
        let dir = tempfile::tempdir().unwrap();
        let mut plugin = UVuePlugin::new(dir.path(), PluginRegistry::new());

        plugin.handle(BuildEvent::Run).await.unwrap();
        assert!(!read_main(dir.path()).contains("require(\"a\")"));

        write_config(dir.path(), r#"{ "imports": ["a"] }"#);
        plugin.handle(BuildEvent::Run).await.unwrap();
        assert!(read_main(dir.path()).contains("require(\"a\");"));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "{ nope");

        let mut plugin = UVuePlugin::new(dir.path(), PluginRegistry::new());
        let err = plugin.handle(BuildEvent::Run).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Generate(_)));
        assert_eq!(plugin.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_watch_run_starts_watcher_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut plugin = UVuePlugin::new(dir.path(), PluginRegistry::new());

        plugin.handle(BuildEvent::WatchRun).await.unwrap();
        assert!(plugin.is_watching());
        plugin.handle(BuildEvent::WatchRun).await.unwrap();
        assert!(plugin.is_watching());
        assert!(read_main(dir.path()).contains("if (process.client) {"));
    }

    #[tokio::test]
    async fn test_config_change_regenerates_while_watching() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{ "imports": [] }"#);

        let mut plugin = UVuePlugin::new(dir.path(), PluginRegistry::new());
        plugin.handle(BuildEvent::WatchRun).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        write_config(
            dir.path(),
            r#"{ "imports": [{ "src": "@/plugins/analytics", "ssr": false }] }"#,
        );

        let mut regenerated = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if read_main(dir.path()).contains("require(\"@/plugins/analytics\");") {
                regenerated = true;
                break;
            }
        }
        assert!(regenerated, "main module was not regenerated after config edit");
    }

    #[tokio::test]
    async fn test_emit_phases_dispatch_hooks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{ "plugins": ["A", ["B", { "x": 1 }], "runtime-only"] }"#);

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register("A", Recorder { name: "A", log: log.clone() });
        registry.register("B", Recorder { name: "B", log: log.clone() });

        let mut plugin = UVuePlugin::new(dir.path(), registry);
        let mut compilation = Compilation::default();
        plugin.handle(BuildEvent::Emit(&mut compilation)).await.unwrap();
        plugin.handle(BuildEvent::AfterEmit(&mut compilation)).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["emit:A", "emit:B", "afterEmit:A", "afterEmit:B"]
        );
    }

    #[tokio::test]
    async fn test_hook_failure_fails_the_phase() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{ "plugins": ["failing", "A"] }"#);

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register("failing", Failing);
        registry.register("A", Recorder { name: "A", log: log.clone() });

        let mut plugin = UVuePlugin::new(dir.path(), registry);
        let mut compilation = Compilation::default();

        plugin.handle(BuildEvent::Emit(&mut compilation)).await.unwrap();
        let err = plugin
            .handle(BuildEvent::AfterEmit(&mut compilation))
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Plugin(PluginError::Hook { .. })));
        assert_eq!(*log.lock().unwrap(), vec!["emit:A"]);
    }

    #[tokio::test]
    async fn test_transform_uses_project_entry_path() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{ "paths": { "main": "app/entry" } }"#);

        let plugin = UVuePlugin::new(dir.path(), PluginRegistry::new());
        let main_path = plugin.config().unwrap().main_path().to_string();

        let output = plugin
            .transform_module(
                &format!("{}.js", main_path),
                ModuleSource::new("export default () => new Vue({})"),
            )
            .unwrap();
        assert_eq!(
            output.content,
            "import initApp from '@uvue/core/lib/initApp';\nexport default (context) => initApp({}, context)"
        );
    }
}
