//! EPUB support for the built-in engine.
//!
//! An EPUB is a zip archive: META-INF/container.xml points at the OPF
//! package document, which carries the Dublin Core metadata, the manifest
//! (id to href), the spine (reading order) and the cover declaration.
//! Chapter units are spine positions; titles and the table of contents come
//! from the NCX navigation file when present.

use super::EngineError;
use crate::models::{BookMetadata, Chapter, TocEntry};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

/// Parsed OPF package document.
struct Package {
    title: Option<String>,
    creator: Option<String>,
    manifest: Vec<ManifestItem>,
    /// Manifest ids in reading order.
    spine: Vec<String>,
    /// Id named by `<meta name="cover" content="...">`, if any.
    cover_id: Option<String>,
    /// Directory of the OPF inside the archive; hrefs resolve against it.
    opf_dir: String,
}

pub fn extract_metadata(path: &Path) -> Result<BookMetadata, EngineError> {
    let mut archive = open_archive(path)?;
    let package = load_package(&mut archive)?;

    let cover_data = read_cover(&mut archive, &package);

    Ok(BookMetadata {
        title: package.title,
        author: package.creator,
        cover_data,
        total_units: package.spine.len() as u32,
    })
}

pub fn chapter_count(path: &Path) -> Result<u32, EngineError> {
    let mut archive = open_archive(path)?;
    let package = load_package(&mut archive)?;
    Ok(package.spine.len() as u32)
}

/// Chapter HTML by spine position (1-based). The title comes from the NCX
/// entry pointing at the same document, falling back to "Chapter N".
pub fn chapter(path: &Path, index: u32) -> Result<Chapter, EngineError> {
    let mut archive = open_archive(path)?;
    let package = load_package(&mut archive)?;

    let total = package.spine.len() as u32;
    if index < 1 || index > total {
        return Err(EngineError::OutOfRange { index, total });
    }

    let href = package
        .spine_href(index)
        .ok_or_else(|| EngineError::Parse {
            message: format!("spine entry {index} missing from manifest"),
        })?;
    let entry = package.resolve(&href);
    let html = read_entry_string(&mut archive, &entry)?;

    let title = nav_points(&mut archive, &package)
        .into_iter()
        .find(|point| strip_fragment(&point.src) == href)
        .map(|point| point.label)
        .unwrap_or_else(|| format!("Chapter {index}"));

    Ok(Chapter { title, html })
}

/// Table of contents in document order. NCX entries that do not resolve to a
/// spine document are dropped.
pub fn table_of_contents(path: &Path) -> Result<Vec<TocEntry>, EngineError> {
    let mut archive = open_archive(path)?;
    let package = load_package(&mut archive)?;

    let toc = nav_points(&mut archive, &package)
        .into_iter()
        .filter_map(|point| {
            let unit = package.spine_position(strip_fragment(&point.src))?;
            Some(TocEntry {
                title: point.label,
                target_unit: unit,
            })
        })
        .collect();

    Ok(toc)
}

pub fn cover(path: &Path) -> Result<Option<Vec<u8>>, EngineError> {
    let mut archive = open_archive(path)?;
    let package = load_package(&mut archive)?;
    Ok(read_cover(&mut archive, &package))
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, EngineError> {
    if !path.exists() {
        return Err(EngineError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path).map_err(|err| EngineError::Parse {
        message: err.to_string(),
    })?;
    ZipArchive::new(file).map_err(|err| EngineError::Parse {
        message: format!("not a readable EPUB archive: {err}"),
    })
}

fn load_package(archive: &mut ZipArchive<File>) -> Result<Package, EngineError> {
    let opf_path = find_opf_path(archive)?;
    let opf_dir = Path::new(&opf_path)
        .parent()
        .map(|dir| dir.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let xml = read_entry_string(archive, &opf_path)?;
    parse_opf(&xml, opf_dir)
}

/// Locate the OPF via `<rootfile full-path="...">` in container.xml.
fn find_opf_path(archive: &mut ZipArchive<File>) -> Result<String, EngineError> {
    let xml = read_entry_string(archive, "META-INF/container.xml")
        .map_err(|_| EngineError::Parse {
            message: "missing META-INF/container.xml".to_string(),
        })?;

    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"rootfile" {
                    if let Some(path) = attr_value(&e, b"full-path") {
                        return Ok(path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EngineError::Parse {
                    message: err.to_string(),
                })
            }
            _ => (),
        }
        buf.clear();
    }

    Err(EngineError::Parse {
        message: "no rootfile in container.xml".to_string(),
    })
}

fn parse_opf(xml: &str, opf_dir: String) -> Result<Package, EngineError> {
    let mut package = Package {
        title: None,
        creator: None,
        manifest: Vec::new(),
        spine: Vec::new(),
        cover_id: None,
        opf_dir,
    };

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut in_title = false;
    let mut in_creator = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"dc:title" => in_title = true,
                b"dc:creator" => in_creator = true,
                b"meta" => record_cover_meta(&e, &mut package),
                b"item" => record_item(&e, &mut package),
                b"itemref" => record_itemref(&e, &mut package),
                _ => (),
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"meta" => record_cover_meta(&e, &mut package),
                b"item" => record_item(&e, &mut package),
                b"itemref" => record_itemref(&e, &mut package),
                _ => (),
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().into_owned();
                if in_title && package.title.is_none() {
                    package.title = Some(text);
                } else if in_creator && package.creator.is_none() {
                    package.creator = Some(text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"dc:title" => in_title = false,
                b"dc:creator" => in_creator = false,
                _ => (),
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EngineError::Parse {
                    message: err.to_string(),
                })
            }
            _ => (),
        }
        buf.clear();
    }

    Ok(package)
}

fn record_cover_meta(e: &quick_xml::events::BytesStart, package: &mut Package) {
    if attr_value(e, b"name").as_deref() == Some("cover") {
        if let Some(content) = attr_value(e, b"content") {
            package.cover_id = Some(content);
        }
    }
}

fn record_item(e: &quick_xml::events::BytesStart, package: &mut Package) {
    let id = attr_value(e, b"id").unwrap_or_default();
    let href = attr_value(e, b"href").unwrap_or_default();
    if id.is_empty() || href.is_empty() {
        return;
    }
    package.manifest.push(ManifestItem {
        id,
        href,
        media_type: attr_value(e, b"media-type").unwrap_or_default(),
        properties: attr_value(e, b"properties").unwrap_or_default(),
    });
}

fn record_itemref(e: &quick_xml::events::BytesStart, package: &mut Package) {
    if let Some(idref) = attr_value(e, b"idref") {
        package.spine.push(idref);
    }
}

fn attr_value(e: &quick_xml::events::BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes() {
        if let Ok(attr) = attr {
            if attr.key.as_ref() == key {
                return Some(String::from_utf8_lossy(&attr.value).to_string());
            }
        }
    }
    None
}

impl Package {
    /// Href (relative to the OPF) of the spine entry at `index` (1-based).
    fn spine_href(&self, index: u32) -> Option<String> {
        let idref = self.spine.get((index - 1) as usize)?;
        self.manifest
            .iter()
            .find(|item| &item.id == idref)
            .map(|item| item.href.clone())
    }

    /// 1-based spine position of the document at `href`.
    fn spine_position(&self, href: &str) -> Option<u32> {
        let id = &self
            .manifest
            .iter()
            .find(|item| item.href == href)?
            .id;
        self.spine
            .iter()
            .position(|idref| idref == id)
            .map(|pos| pos as u32 + 1)
    }

    /// Cover href from `properties="cover-image"` or the `meta name="cover"`
    /// indirection.
    fn cover_href(&self) -> Option<String> {
        if let Some(item) = self
            .manifest
            .iter()
            .find(|item| item.properties.contains("cover-image"))
        {
            return Some(item.href.clone());
        }
        let cover_id = self.cover_id.as_ref()?;
        self.manifest
            .iter()
            .find(|item| &item.id == cover_id)
            .map(|item| item.href.clone())
    }

    fn ncx_href(&self) -> Option<String> {
        self.manifest
            .iter()
            .find(|item| {
                item.media_type == "application/x-dtbncx+xml" || item.href.ends_with(".ncx")
            })
            .map(|item| item.href.clone())
    }

    /// Resolve an href against the OPF directory; zip names use forward
    /// slashes.
    fn resolve(&self, href: &str) -> String {
        if self.opf_dir.is_empty() {
            href.to_string()
        } else {
            format!("{}/{}", self.opf_dir, href)
        }
    }
}

fn read_cover(archive: &mut ZipArchive<File>, package: &Package) -> Option<Vec<u8>> {
    let href = package.cover_href()?;
    let entry = package.resolve(&href);
    read_entry_bytes(archive, &entry).ok()
}

struct NavPoint {
    label: String,
    /// Content src, relative to the OPF directory, possibly with a fragment.
    src: String,
}

/// Flattened NCX nav points in document order. Missing or malformed NCX
/// yields an empty list; chapter access still works without it.
fn nav_points(archive: &mut ZipArchive<File>, package: &Package) -> Vec<NavPoint> {
    let Some(href) = package.ncx_href() else {
        return Vec::new();
    };
    let entry = package.resolve(&href);
    let Ok(xml) = read_entry_string(archive, &entry) else {
        return Vec::new();
    };

    let mut points: Vec<NavPoint> = Vec::new();
    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    let mut in_label_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"navPoint" => points.push(NavPoint {
                    label: String::new(),
                    src: String::new(),
                }),
                b"text" => in_label_text = true,
                b"content" => record_nav_src(&e, &mut points),
                _ => (),
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"content" {
                    record_nav_src(&e, &mut points);
                }
            }
            Ok(Event::Text(e)) => {
                if in_label_text {
                    if let Some(point) = points.last_mut() {
                        if point.label.is_empty() {
                            point.label = e.unescape().unwrap_or_default().into_owned();
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"text" {
                    in_label_text = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return Vec::new(),
            _ => (),
        }
        buf.clear();
    }

    points
        .into_iter()
        .filter(|point| !point.label.is_empty() && !point.src.is_empty())
        .collect()
}

fn record_nav_src(e: &quick_xml::events::BytesStart, points: &mut Vec<NavPoint>) {
    if let Some(src) = attr_value(e, b"src") {
        if let Some(point) = points.last_mut() {
            if point.src.is_empty() {
                point.src = src;
            }
        }
    }
}

fn strip_fragment(src: &str) -> &str {
    src.split('#').next().unwrap_or(src)
}

fn read_entry_string(archive: &mut ZipArchive<File>, name: &str) -> Result<String, EngineError> {
    let mut entry = archive.by_name(name).map_err(|err| EngineError::Parse {
        message: format!("missing archive entry {name}: {err}"),
    })?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|err| EngineError::Parse {
            message: err.to_string(),
        })?;
    Ok(text)
}

fn read_entry_bytes(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, EngineError> {
    let mut entry = archive.by_name(name).map_err(|err| EngineError::Parse {
        message: format!("missing archive entry {name}: {err}"),
    })?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|err| EngineError::Parse {
            message: err.to_string(),
        })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Novel</dc:title>
    <dc:creator>Ada Lovelace</dc:creator>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

    const NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>One</text></navLabel>
      <content src="ch1.xhtml"/>
    </navPoint>
    <navPoint id="p2" playOrder="2">
      <navLabel><text>Two</text></navLabel>
      <content src="ch2.xhtml#start"/>
    </navPoint>
  </navMap>
</ncx>"#;

    const COVER_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn write_fixture(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(CONTAINER.as_bytes()).unwrap();
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(OPF.as_bytes()).unwrap();
        zip.start_file("OEBPS/toc.ncx", options).unwrap();
        zip.write_all(NCX.as_bytes()).unwrap();
        zip.start_file("OEBPS/ch1.xhtml", options).unwrap();
        zip.write_all(b"<html><body><p>first chapter</p></body></html>")
            .unwrap();
        zip.start_file("OEBPS/ch2.xhtml", options).unwrap();
        zip.write_all(b"<html><body><p>second chapter</p></body></html>")
            .unwrap();
        zip.start_file("OEBPS/cover.jpg", options).unwrap();
        zip.write_all(COVER_BYTES).unwrap();
        zip.finish().unwrap();
    }

    fn fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("novel.epub");
        write_fixture(&path);
        path
    }

    #[test]
    fn extracts_metadata_and_cover() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir);

        let meta = extract_metadata(&path).unwrap();
        assert_eq!(meta.title, Some("Novel".to_string()));
        assert_eq!(meta.author, Some("Ada Lovelace".to_string()));
        assert_eq!(meta.total_units, 2);
        assert_eq!(meta.cover_data.as_deref(), Some(COVER_BYTES));
    }

    #[test]
    fn counts_spine_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir);
        assert_eq!(chapter_count(&path).unwrap(), 2);
    }

    #[test]
    fn reads_chapters_with_ncx_titles() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir);

        let first = chapter(&path, 1).unwrap();
        assert_eq!(first.title, "One");
        assert!(first.html.contains("first chapter"));

        let second = chapter(&path, 2).unwrap();
        assert_eq!(second.title, "Two");
        assert!(second.html.contains("second chapter"));
    }

    #[test]
    fn chapter_index_is_range_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir);
        assert!(matches!(
            chapter(&path, 0),
            Err(EngineError::OutOfRange { .. })
        ));
        assert!(matches!(
            chapter(&path, 3),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    #[test]
    fn toc_maps_to_spine_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir);

        let toc = table_of_contents(&path).unwrap();
        assert_eq!(
            toc,
            vec![
                TocEntry {
                    title: "One".to_string(),
                    target_unit: 1
                },
                TocEntry {
                    title: "Two".to_string(),
                    target_unit: 2
                },
            ]
        );
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = chapter_count(Path::new("/nowhere/ghost.epub")).unwrap_err();
        assert!(matches!(err, EngineError::FileNotFound { .. }));
    }

    #[test]
    fn non_zip_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.epub");
        std::fs::write(&path, b"plain text, not a zip").unwrap();
        let err = chapter_count(&path).unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
    }
}
