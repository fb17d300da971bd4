//! Renames older directive names/shapes in place before validation, so
//! configuration files written against an earlier directive layout keep
//! validating.

use crate::directive::Directive;

/// One rename rule. `rename` covers a simple name change; `flatten_refer`
/// covers the one structural rewrite in the table (`refer target…` →
/// `refer { enabled on; all target…; }`).
enum Rule {
    RenameTopLevel { from: &'static str, to: &'static str },
    RenameChild { parent: &'static str, from: &'static str, to: &'static str },
    FlattenRefer,
}

const RULES: &[Rule] = &[
    Rule::RenameTopLevel {
        from: "http_stream",
        to: "http_server",
    },
    Rule::RenameChild {
        parent: "vhost",
        from: "http",
        to: "http_static",
    },
    Rule::FlattenRefer,
];

/// Applies every known compat rename to `root` in place.
pub fn apply_compat_transforms(root: &mut Directive) {
    rename_top_level(root);
    walk_vhosts(root);
}

fn rename_top_level(root: &mut Directive) {
    for child in &mut root.children {
        for rule in RULES {
            if let Rule::RenameTopLevel { from, to } = rule {
                if child.name == *from {
                    child.name = (*to).to_string();
                }
            }
        }
    }
}

fn walk_vhosts(root: &mut Directive) {
    for vhost in root.children.iter_mut().filter(|d| d.name == "vhost") {
        for rule in RULES {
            match rule {
                Rule::RenameChild { parent, from, to } if *parent == "vhost" => {
                    for child in &mut vhost.children {
                        if child.name == *from {
                            child.name = (*to).to_string();
                        }
                    }
                }
                Rule::FlattenRefer => flatten_refer(vhost),
                _ => {}
            }
        }
    }
}

/// Rewrites a flattened `refer target1 target2…;` scalar into the nested
/// `refer { enabled on; all target1 target2…; }` block form, leaving an
/// already-nested `refer { ... }` untouched.
fn flatten_refer(vhost: &mut Directive) {
    if let Some(idx) = vhost.children.iter().position(|d| d.name == "refer") {
        let flat = &vhost.children[idx];
        if flat.children.is_empty() && !flat.args.is_empty() {
            let line = flat.line;
            let file = flat.file.clone();
            let targets = flat.args.clone();
            let mut block = Directive::new("refer", vec![], line, file.clone());
            let mut enabled = Directive::new("enabled", vec!["on".into()], line, file.clone());
            enabled.line = line;
            let mut all = Directive::new("all", targets, line, file);
            all.line = line;
            block.children.push(enabled);
            block.children.push(all);
            vhost.children[idx] = block;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::parse_str;
    use std::path::Path;

    #[test]
    fn renames_http_stream_to_http_server() {
        let mut root = parse_str("http_stream { enabled on; }", Path::new("t.conf")).unwrap();
        apply_compat_transforms(&mut root);
        assert!(root.get("http_server").is_some());
        assert!(root.get("http_stream").is_none());
    }

    #[test]
    fn renames_vhost_http_to_http_static() {
        let mut root = parse_str("vhost v { http { enabled on; } }", Path::new("t.conf")).unwrap();
        apply_compat_transforms(&mut root);
        let vhost = root.get("vhost").unwrap();
        assert!(vhost.get("http_static").is_some());
    }

    #[test]
    fn flattens_scalar_refer_into_nested_block() {
        let mut root = parse_str("vhost v { refer a.com b.com; }", Path::new("t.conf")).unwrap();
        apply_compat_transforms(&mut root);
        let vhost = root.get("vhost").unwrap();
        let refer = vhost.get("refer").unwrap();
        assert_eq!(refer.get("enabled").unwrap().args, vec!["on"]);
        assert_eq!(refer.get("all").unwrap().args, vec!["a.com", "b.com"]);
    }
}
