//! Percent escapes for `-print`, `-identify -format`, `-annotate` and `-set`.
//!
//! | Escape | Value |
//! |---|---|
//! | `%w` `%h` | image width / height |
//! | `%W` `%H` | virtual canvas width / height |
//! | `%X` `%Y` | canvas offset, signed (`+3`, `-2`) |
//! | `%x` `%y` | horizontal / vertical density |
//! | `%f` `%d` `%e` `%t` | file name, directory, extension, name without extension |
//! | `%m` | format tag |
//! | `%s` `%n` | scene number, number of images in the list |
//! | `%z` `%q` | image depth, quantum depth |
//! | `%c` `%l` | `comment` / `label` properties |
//! | `%#` | pixel signature |
//! | `%[name]` | property, then artifact, then wand option |
//! | `%%` | a literal `%` |
//!
//! A leading `@` reads the text from a file first. Backslash escapes `\n`,
//! `\r` and `\\` are expanded. Unknown escapes are copied through untouched.

use crate::image::Image;
use crate::settings::ImageInfo;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("unable to read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What an escape can see: the current image (if any), the settings and the
/// length of the active list.
#[derive(Debug, Clone, Copy)]
pub struct PropertyContext<'a> {
    pub info: &'a ImageInfo,
    pub image: Option<&'a Image>,
    pub list_len: usize,
}

/// Expand `text` in `ctx`.
pub fn interpret_properties(text: &str, ctx: &PropertyContext<'_>) -> Result<String, PropertyError> {
    let source = match text.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|source| PropertyError::Read {
            path: path.to_string(),
            source,
        })?,
        None => text.to_string(),
    };

    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '%' => match chars.next() {
                Some('[') => {
                    let mut name = String::new();
                    for n in chars.by_ref() {
                        if n == ']' {
                            break;
                        }
                        name.push(n);
                    }
                    out.push_str(&named_value(&name, ctx));
                }
                Some(key) => match single_escape(key, ctx) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('%');
                        out.push(key);
                    }
                },
                None => out.push('%'),
            },
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn named_value(name: &str, ctx: &PropertyContext<'_>) -> String {
    if let Some(image) = ctx.image {
        if let Some(value) = image.property(name) {
            return value.to_string();
        }
        if let Some(value) = image.artifacts.get(name) {
            return value.clone();
        }
    }
    let key = name.strip_prefix("option:").unwrap_or(name);
    ctx.info.option(key).unwrap_or_default().to_string()
}

fn single_escape(key: char, ctx: &PropertyContext<'_>) -> Option<String> {
    if key == '%' {
        return Some("%".into());
    }
    if key == 'n' {
        return Some(ctx.list_len.to_string());
    }
    if key == 'q' {
        return Some("8".into());
    }
    let Some(image) = ctx.image else {
        // Image escapes expand to nothing when there is no image.
        return "whWHXYxyfdetmszcl#".contains(key).then(String::new);
    };
    let path = Path::new(&image.filename);
    let (dx, dy) = image.density.unwrap_or((72.0, 72.0));
    let value = match key {
        'w' => image.width().to_string(),
        'h' => image.height().to_string(),
        'W' => image.page.width.to_string(),
        'H' => image.page.height.to_string(),
        'X' => format!("{:+}", image.page.x),
        'Y' => format!("{:+}", image.page.y),
        'x' => dx.to_string(),
        'y' => dy.to_string(),
        'f' => path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
        'd' => path
            .parent()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default(),
        'e' => path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        't' => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        'm' => image.magick.clone(),
        's' => image.scene.to_string(),
        'z' => image.depth.to_string(),
        'c' => image.property("comment").unwrap_or_default().to_string(),
        'l' => image.property("label").unwrap_or_default().to_string(),
        '#' => image.signature(),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn sample() -> Image {
        let mut image = Image::canvas(30, 20, Color::BLACK);
        image.filename = "photos/beach.png".into();
        image.magick = "PNG".into();
        image.scene = 2;
        image.page.width = 100;
        image.page.height = 80;
        image.page.x = -5;
        image.page.y = 7;
        image.set_property("comment", "hello");
        image
    }

    fn expand(text: &str, image: Option<&Image>) -> String {
        let info = ImageInfo::default();
        let ctx = PropertyContext {
            info: &info,
            image,
            list_len: 3,
        };
        interpret_properties(text, &ctx).unwrap()
    }

    #[test]
    fn geometry_escapes() {
        let image = sample();
        assert_eq!(expand("%wx%h", Some(&image)), "30x20");
        assert_eq!(expand("%Wx%H%X%Y", Some(&image)), "100x80-5+7");
    }

    #[test]
    fn filename_escapes() {
        let image = sample();
        assert_eq!(expand("%d|%f|%t|%e|%m", Some(&image)), "photos|beach.png|beach|png|PNG");
    }

    #[test]
    fn list_and_scene() {
        let image = sample();
        assert_eq!(expand("%s of %n", Some(&image)), "2 of 3");
        assert_eq!(expand("%n", None), "3");
    }

    #[test]
    fn named_properties_fall_back_to_options() {
        let image = sample();
        let mut info = ImageInfo::default();
        info.set_option("gravity", "North");
        let ctx = PropertyContext {
            info: &info,
            image: Some(&image),
            list_len: 1,
        };
        assert_eq!(
            interpret_properties("%[comment] %[gravity] %[option:gravity] [%[nothing]]", &ctx).unwrap(),
            "hello North North []"
        );
    }

    #[test]
    fn literal_percent_and_unknown_escape() {
        assert_eq!(expand("100%% %v", None), "100% %v");
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(expand("a\\nb\\\\c", None), "a\nb\\c");
    }

    #[test]
    fn image_escapes_without_image_are_empty() {
        assert_eq!(expand("[%w]", None), "[]");
    }

    #[test]
    fn at_file_reads_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("caption.txt");
        std::fs::write(&path, "size %wx%h").unwrap();
        let image = sample();
        assert_eq!(expand(&format!("@{}", path.display()), Some(&image)), "size 30x20");
    }

    #[test]
    fn missing_at_file_errors() {
        let info = ImageInfo::default();
        let ctx = PropertyContext {
            info: &info,
            image: None,
            list_len: 0,
        };
        assert!(interpret_properties("@/nonexistent/caption.txt", &ctx).is_err());
    }
}
