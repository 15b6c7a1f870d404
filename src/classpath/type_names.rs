use crate::classfile::CLASS_SUFFIX;
use crate::image::{ImageError, ImageVisitor, ModuleFilter, WalkControl};

/// Collects the type names directly inside one package.
///
/// Modules outside the filter and directories off the path to the package are
/// pruned. Prefix checks stop at `/` boundaries, so `a/b` never descends into
/// `a/bx` and never collects from `a/b/c`.
pub struct TypeNameCollector<'a> {
    package: &'a str,
    module: ModuleFilter<'a>,
    names: Vec<Vec<String>>,
}

impl<'a> TypeNameCollector<'a> {
    pub fn new(package: &'a str, module: ModuleFilter<'a>) -> Self {
        Self {
            package,
            module,
            names: Vec::new(),
        }
    }

    pub fn into_names(self) -> Vec<Vec<String>> {
        self.names
    }

    fn leads_to_package(&self, dir: &str) -> bool {
        match self.package.strip_prefix(dir) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl ImageVisitor for TypeNameCollector<'_> {
    fn visit_module(&mut self, module: &str) -> Result<WalkControl, ImageError> {
        Ok(if self.module.admits(module) {
            WalkControl::Continue
        } else {
            WalkControl::SkipSubtree
        })
    }

    fn visit_package(&mut self, dir: &str, _module: &str) -> Result<WalkControl, ImageError> {
        Ok(if self.leads_to_package(dir) {
            WalkControl::Continue
        } else {
            WalkControl::SkipSubtree
        })
    }

    fn visit_file(&mut self, file: &str, _module: &str) -> Result<WalkControl, ImageError> {
        let (parent, name) = file.rsplit_once('/').unwrap_or(("", file));
        if parent != self.package {
            return Ok(WalkControl::Continue);
        }
        if let Some(type_name) = name.strip_suffix(CLASS_SUFFIX) {
            let mut qualified: Vec<String> =
                self.package.split('/').map(str::to_string).collect();
            qualified.push(type_name.to_string());
            self.names.push(qualified);
        }
        Ok(WalkControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pruning_respects_segment_boundaries() {
        let collector = TypeNameCollector::new("a/b", ModuleFilter::Unnamed);
        assert!(collector.leads_to_package("a"));
        assert!(collector.leads_to_package("a/b"));
        assert!(!collector.leads_to_package("a/bx"));
        assert!(!collector.leads_to_package("a/b/c"));

        let deeper = TypeNameCollector::new("a/bc", ModuleFilter::Unnamed);
        assert!(!deeper.leads_to_package("a/b"));
    }

    #[test]
    fn collects_only_immediate_class_files() {
        let mut collector = TypeNameCollector::new("a/b", ModuleFilter::Unnamed);
        for file in ["a/b/C.class", "a/b/c/D.class", "a/bx/E.class", "a/b/notes.txt"] {
            collector.visit_file(file, "m").unwrap();
        }
        assert_eq!(
            collector.into_names(),
            vec![vec!["a".to_string(), "b".to_string(), "C".to_string()]]
        );
    }
}
