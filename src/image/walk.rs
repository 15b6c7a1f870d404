use super::layout::{join, ModuleContents};
use super::{ImageError, ModuleImage};

/// Directive returned by every visitor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// For module and package events, do not descend. Ignored for files.
    SkipSubtree,
}

/// Which events a walk reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Only module events; module subtrees are never entered.
    Modules,
    /// Module, package and file events.
    All,
}

/// Receives walk events. Paths are `/` separated and relative to the module
/// root; `module` is the module's on-disk name.
pub trait ImageVisitor {
    fn visit_module(&mut self, module: &str) -> Result<WalkControl, ImageError> {
        let _ = module;
        Ok(WalkControl::Continue)
    }

    fn visit_package(&mut self, dir: &str, module: &str) -> Result<WalkControl, ImageError> {
        let _ = (dir, module);
        Ok(WalkControl::Continue)
    }

    fn visit_file(&mut self, file: &str, module: &str) -> Result<WalkControl, ImageError> {
        let _ = (file, module);
        Ok(WalkControl::Continue)
    }
}

/// Walks every module of `image`. An error from the image or the visitor
/// stops the walk.
pub fn walk(
    image: &ModuleImage,
    visitor: &mut dyn ImageVisitor,
    mode: NotifyMode,
) -> Result<(), ImageError> {
    let contents = image.contents()?;
    for module in contents.modules() {
        if visitor.visit_module(module.name())? == WalkControl::SkipSubtree {
            continue;
        }
        if mode == NotifyMode::All {
            walk_module(module, visitor)?;
        }
    }
    Ok(())
}

fn walk_module(module: &ModuleContents, visitor: &mut dyn ImageVisitor) -> Result<(), ImageError> {
    let mut pending = vec![String::new()];
    while let Some(dir) = pending.pop() {
        let Some(listing) = module.tree().listing(&dir) else {
            continue;
        };
        for file in &listing.files {
            visitor.visit_file(&join(&dir, file), module.name())?;
        }
        let mut descend = Vec::new();
        for subdir in &listing.subdirs {
            if visitor.visit_package(subdir, module.name())? == WalkControl::Continue {
                descend.push(subdir.clone());
            }
        }
        // Reversed so the stack pops children in sorted order.
        pending.extend(descend.into_iter().rev());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::ImageFixture;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        skip_module: Option<&'static str>,
        skip_dir: Option<&'static str>,
    }

    impl ImageVisitor for Recorder {
        fn visit_module(&mut self, module: &str) -> Result<WalkControl, ImageError> {
            self.events.push(format!("module {module}"));
            Ok(if self.skip_module == Some(module) {
                WalkControl::SkipSubtree
            } else {
                WalkControl::Continue
            })
        }

        fn visit_package(&mut self, dir: &str, module: &str) -> Result<WalkControl, ImageError> {
            self.events.push(format!("package {module}:{dir}"));
            Ok(if self.skip_dir == Some(dir) {
                WalkControl::SkipSubtree
            } else {
                WalkControl::Continue
            })
        }

        fn visit_file(&mut self, file: &str, module: &str) -> Result<WalkControl, ImageError> {
            self.events.push(format!("file {module}:{file}"));
            Ok(WalkControl::Continue)
        }
    }

    fn fixture() -> crate::tests::fixtures::BuiltImage {
        ImageFixture::exploded()
            .module("m.one")
            .class("m.one", "a/b/C")
            .class("m.one", "a/x/D")
            .module("m.two")
            .class("m.two", "z/E")
            .build()
    }

    #[test]
    fn module_mode_reports_only_modules() {
        let built = fixture();
        let mut recorder = Recorder::default();
        walk(&built.image(), &mut recorder, NotifyMode::Modules).expect("walk");
        assert_eq!(recorder.events, vec!["module m.one", "module m.two"]);
    }

    #[test]
    fn skip_directives_prune_subtrees() {
        let built = fixture();
        let mut recorder = Recorder {
            skip_module: Some("m.two"),
            skip_dir: Some("a/x"),
            ..Recorder::default()
        };
        walk(&built.image(), &mut recorder, NotifyMode::All).expect("walk");

        assert_eq!(
            recorder.events,
            vec![
                "module m.one",
                "file m.one:module-info.class",
                "package m.one:a",
                "package m.one:a/b",
                "package m.one:a/x",
                "file m.one:a/b/C.class",
                "module m.two",
            ]
        );
    }
}
