//! Test fixtures: upstream documents in the shapes real servers return.

/// A yarn v1 lockfile mixing fragment-sealed, unsealed, scoped and
/// multi-specifier entries.
pub const YARN_LOCK: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@types/node@^8.0.0", "@types/node@^8.0.24":
  version "8.10.38"
  resolved "https://registry.yarnpkg.com/@types/node/-/node-8.10.38.tgz#e05c201a668492e534b48102aca0294898f449f6"

left-pad@1.3.0:
  version "1.3.0"
  resolved "https://registry.example/left-pad-1.3.0.tgz#abcd1234"

native-keymap@1.2.5:
  version "1.2.5"
  resolved "https://github.com/Microsoft/node-native-keymap/archive/v1.2.5.tar.gz"
  dependencies:
    nan "^2.10.0"
"#;

/// Encode one pkt-line.
pub fn pkt_line(payload: &str) -> String {
    format!("{:04x}{}", payload.len() + 4, payload)
}

/// Build a smart-HTTP `upload-pack` ref advertisement.
pub fn ref_advertisement(refs: &[(&str, &str)]) -> Vec<u8> {
    let mut out = pkt_line("# service=git-upload-pack\n");
    out.push_str("0000");
    for (i, (oid, name)) in refs.iter().enumerate() {
        if i == 0 {
            out.push_str(&pkt_line(&format!(
                "{} {}\0multi_ack thin-pack side-band ofs-delta\n",
                oid, name
            )));
        } else {
            out.push_str(&pkt_line(&format!("{} {}\n", oid, name)));
        }
    }
    out.push_str("0000");
    out.into_bytes()
}

/// An HTML page carrying `go-import` meta tags.
pub fn go_import_page(metas: &[(&str, &str, &str)]) -> String {
    let mut out = String::from("<!DOCTYPE html>\n<html>\n<head>\n");
    for (root, vcs, repo) in metas {
        out.push_str(&format!(
            "<meta name=\"go-import\" content=\"{} {} {}\">\n",
            root, vcs, repo
        ));
    }
    out.push_str("</head>\n<body>go get</body>\n</html>\n");
    out
}

/// A `go list -e -json` stream for `root` where every path in `missing`
/// failed to resolve.
pub fn go_list_stream(root: &str, missing: &[String]) -> String {
    let deps_errors: Vec<serde_json::Value> = missing
        .iter()
        .map(|path| {
            serde_json::json!({
                "ImportStack": [root, path],
                "Pos": "",
                "Err": format!("cannot find package \"{}\" in any of:", path),
            })
        })
        .collect();

    let mut record = serde_json::json!({
        "Dir": format!("/gopath/src/{}", root),
        "ImportPath": root,
        "Name": "main",
        "Imports": missing,
    });
    if !deps_errors.is_empty() {
        record["DepsErrors"] = serde_json::Value::Array(deps_errors);
    }

    // go list prints indented objects back to back with no separator
    let mut out = serde_json::to_string_pretty(&record).unwrap_or_default();
    out.push('\n');
    out
}

/// A PEP 503 simple-index page.
pub fn simple_index_page(links: &[(&str, &str)]) -> String {
    let mut out = String::from("<!DOCTYPE html>\n<html>\n  <body>\n");
    for (href, text) in links {
        out.push_str(&format!("    <a href=\"{}\">{}</a><br/>\n", href, text));
    }
    out.push_str("  </body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkt_line_length_includes_prefix() {
        assert_eq!(pkt_line("a\n"), "0006a\n");
    }

    #[test]
    fn test_go_list_stream_is_valid_json() {
        let stream = go_list_stream("example.org/a", &["example.org/b".to_string()]);
        let value: serde_json::Value = serde_json::from_str(&stream).unwrap();
        assert_eq!(value["DepsErrors"][0]["ImportStack"][1], "example.org/b");
    }
}
