//! Directory-prefix table used to derive `dirname1`, `dirname2`, and
//! `logical_dirname` from a filename.
//!
//! `dirname1`/`dirname2` are always the first one/two path components.
//! `logical_dirname` keeps however many components the matching site-path
//! root defines; a filename matching no root falls back to `"unknown
//! directory"` for all three fields.

const UNKNOWN: &str = "unknown directory";

/// `(prefix, components to keep for logical_dirname)`, longest-prefix-wins.
const SITE_ROOTS: &[(&str, usize)] = &[
    ("/user", 2),
    ("/osgconnect/public", 3),
    ("/ospool", 2),
    ("/pnfs/fnal.gov/usr", 4),
    ("/store", 2),
    ("/chtc", 2),
    ("/icecube", 2),
    ("/igwn", 2),
];

/// Derive `(dirname1, dirname2, logical_dirname)` from a filename.
#[must_use]
pub fn derive_dir_fields(filename: &str) -> (String, String, String) {
    let components: Vec<&str> = filename.split('/').filter(|s| !s.is_empty()).collect();
    if components.is_empty() {
        return (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string());
    }

    let dirname1 = format!("/{}", components[0]);
    let dirname2 = if components.len() >= 2 {
        format!("/{}/{}", components[0], components[1])
    } else {
        dirname1.clone()
    };

    let keep = SITE_ROOTS
        .iter()
        .filter(|(prefix, _)| filename.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, keep)| *keep);

    let logical_dirname = match keep {
        Some(keep) if keep <= components.len() => format!("/{}", components[..keep].join("/")),
        Some(_) => format!("/{}", components.join("/")),
        None => UNKNOWN.to_string(),
    };

    (dirname1, dirname2, logical_dirname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osgconnect_public_keeps_three_components_for_logical() {
        let (d1, d2, logical) = derive_dir_fields("/osgconnect/public/user/proj/f");
        assert_eq!(d1, "/osgconnect");
        assert_eq!(d2, "/osgconnect/public");
        assert_eq!(logical, "/osgconnect/public/user");
    }

    #[test]
    fn unmatched_prefix_is_unknown_directory_for_logical_only() {
        let (d1, d2, logical) = derive_dir_fields("/mystery/path/file");
        assert_eq!(d1, "/mystery");
        assert_eq!(d2, "/mystery/path");
        assert_eq!(logical, UNKNOWN);
    }

    #[test]
    fn empty_filename_is_unknown_directory_everywhere() {
        let (d1, d2, logical) = derive_dir_fields("");
        assert_eq!(d1, UNKNOWN);
        assert_eq!(d2, UNKNOWN);
        assert_eq!(logical, UNKNOWN);
    }

    #[test]
    fn shallow_path_shorter_than_keep_depth_uses_whole_path() {
        let (_, _, logical) = derive_dir_fields("/store/x");
        assert_eq!(logical, "/store/x");
    }

    #[test]
    fn longest_matching_prefix_wins() {
        let (_, _, logical) = derive_dir_fields("/pnfs/fnal.gov/usr/dune/tape_backed/raw");
        assert_eq!(logical, "/pnfs/fnal.gov/usr/dune");
    }
}
