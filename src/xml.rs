//! XML projection of a tile artifact
//!
//! ```xml
//! <tile zoom="12" x="845" y="1552" changeset="4242">
//!   <rel class="3" flags="0" type="multipolygon" lat=".." lon=".." name="Lake">
//!     <way class="3" flags="0" layer="0" inner="false"><nd lat=".." lon=".."/>...</way>
//!   </rel>
//!   <way ...>...</way>
//!   <node class="7" flags="0" ele="1655" lat=".." lon=".." name="Peak"/>
//! </tile>
//! ```

use std::io::Write;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use crate::error::{OsmdbError, Result};
use crate::storage::record::RelType;
use crate::tile::{TileFrame, TileHeader, TileNode, TileRel, TileVisitor, TileWay};

fn rel_type_name(rel_type: RelType) -> &'static str {
    match rel_type {
        RelType::None => "none",
        RelType::Boundary => "boundary",
        RelType::Multipolygon => "multipolygon",
    }
}

fn coord(v: f64) -> String {
    format!("{:.7}", v)
}

/// `TileVisitor` writing one XML document per tile
pub struct XmlVisitor<W: Write> {
    writer: Writer<W>,
    frame: Option<TileFrame>,
}

impl<W: Write> XmlVisitor<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
            frame: None,
        }
    }

    fn frame(&self) -> Result<&TileFrame> {
        self.frame
            .as_ref()
            .ok_or_else(|| OsmdbError::Protocol("tile record before the tile header".into()))
    }

    fn position(&self, elem: &mut BytesStart<'_>, x: i16, y: i16) -> Result<()> {
        let (lat, lon) = self.frame()?.inverse(x, y);
        elem.push_attribute(("lat", coord(lat).as_str()));
        elem.push_attribute(("lon", coord(lon).as_str()));
        Ok(())
    }

    fn write_way(&mut self, way: &TileWay<'_>) -> Result<()> {
        let mut elem = BytesStart::new("way");
        elem.push_attribute(("class", way.class.to_string().as_str()));
        elem.push_attribute(("flags", way.flags.to_string().as_str()));
        elem.push_attribute(("layer", way.layer.to_string().as_str()));
        elem.push_attribute(("inner", if way.inner { "true" } else { "false" }));
        if let Some(name) = way.name {
            elem.push_attribute(("name", name));
        }
        self.writer.write_event(Event::Start(elem))?;

        for (x, y) in way.points() {
            let mut nd = BytesStart::new("nd");
            self.position(&mut nd, x, y)?;
            self.writer.write_event(Event::Empty(nd))?;
        }
        self.writer.write_event(Event::End(BytesEnd::new("way")))?;
        Ok(())
    }

    /// Close the document and return the sink
    pub fn finish(mut self) -> Result<W> {
        if self.frame.is_some() {
            self.writer.write_event(Event::End(BytesEnd::new("tile")))?;
        }
        Ok(self.writer.into_inner())
    }
}

impl<W: Write> TileVisitor for XmlVisitor<W> {
    fn tile(&mut self, header: &TileHeader) -> Result<()> {
        self.frame = Some(TileFrame::new(header.zoom, header.x, header.y)?);

        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut elem = BytesStart::new("tile");
        elem.push_attribute(("zoom", header.zoom.to_string().as_str()));
        elem.push_attribute(("x", header.x.to_string().as_str()));
        elem.push_attribute(("y", header.y.to_string().as_str()));
        elem.push_attribute(("changeset", header.changeset.to_string().as_str()));
        self.writer.write_event(Event::Start(elem))?;
        Ok(())
    }

    fn rel(&mut self, rel: &TileRel<'_>) -> Result<()> {
        let mut elem = BytesStart::new("rel");
        elem.push_attribute(("class", rel.class.to_string().as_str()));
        elem.push_attribute(("flags", rel.flags.to_string().as_str()));
        elem.push_attribute(("type", rel_type_name(rel.rel_type)));
        self.position(&mut elem, rel.cx, rel.cy)?;
        if let Some(name) = rel.name {
            elem.push_attribute(("name", name));
        }
        self.writer.write_event(Event::Start(elem))?;
        Ok(())
    }

    fn member(&mut self, way: &TileWay<'_>) -> Result<()> {
        self.write_way(way)
    }

    fn end_rel(&mut self) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new("rel")))?;
        Ok(())
    }

    fn way(&mut self, way: &TileWay<'_>) -> Result<()> {
        self.write_way(way)
    }

    fn node(&mut self, node: &TileNode<'_>) -> Result<()> {
        let mut elem = BytesStart::new("node");
        elem.push_attribute(("class", node.class.to_string().as_str()));
        elem.push_attribute(("flags", node.flags.to_string().as_str()));
        elem.push_attribute(("ele", node.ele.to_string().as_str()));
        self.position(&mut elem, node.x, node.y)?;
        if let Some(name) = node.name {
            elem.push_attribute(("name", name));
        }
        self.writer.write_event(Event::Empty(elem))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{parse, TileStream};
    use quick_xml::Reader;

    fn sample() -> Vec<u8> {
        let mut s = TileStream::new();
        s.begin_tile(12, 845, 1552, 4242).unwrap();
        let (lat, lon) = s.frame().unwrap().bounds().center();
        s.begin_rel(3, 0, RelType::Multipolygon, (lat, lon), Some("Lake & Dam")).unwrap();
        s.begin_way(3, 0, 0, true, None).unwrap();
        s.add_way_coord(lat, lon).unwrap();
        s.add_way_coord(lat + 0.001, lon).unwrap();
        s.end_way().unwrap();
        s.end_rel().unwrap();
        s.begin_way(1, 0, 1, false, Some("Main St")).unwrap();
        s.add_way_coord(lat, lon).unwrap();
        s.add_way_coord(lat, lon + 0.001).unwrap();
        s.add_way_coord(lat, lon + 0.002).unwrap();
        s.end_way().unwrap();
        s.add_node(7, 0, 1655, (lat, lon), Some("Peak")).unwrap();
        s.end_tile().unwrap()
    }

    fn render(tile: &[u8]) -> String {
        let mut xml = XmlVisitor::new(Vec::new());
        parse(tile, &mut xml).unwrap();
        String::from_utf8(xml.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_document_structure() {
        let text = render(&sample());
        let mut reader = Reader::from_str(&text);
        reader.trim_text(true);

        let mut names = Vec::new();
        let mut nds = 0;
        let mut depth_of_member = None;
        let mut depth = 0;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => {
                    depth += 1;
                    let tag = String::from_utf8(e.name().as_ref().to_vec()).unwrap();
                    if tag == "way" && depth_of_member.is_none() {
                        depth_of_member = Some(depth);
                    }
                    if let Some(name) = e.try_get_attribute("name").unwrap() {
                        names.push(name.unescape_value().unwrap().into_owned());
                    }
                }
                Event::Empty(e) => {
                    if e.name().as_ref() == b"nd" {
                        nds += 1;
                    } else if let Some(name) = e.try_get_attribute("name").unwrap() {
                        names.push(name.unescape_value().unwrap().into_owned());
                    }
                }
                Event::End(_) => depth -= 1,
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(depth, 0);
        assert_eq!(names, vec!["Lake & Dam", "Main St", "Peak"]);
        assert_eq!(nds, 5);
        // the member way sits inside <tile><rel>
        assert_eq!(depth_of_member, Some(3));
    }

    #[test]
    fn test_header_attributes() {
        let text = render(&sample());
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<tile zoom=\"12\" x=\"845\" y=\"1552\" changeset=\"4242\">"));
        assert!(text.contains("type=\"multipolygon\""));
        assert!(text.contains("inner=\"true\""));
        assert!(text.contains("ele=\"1655\""));
        assert!(text.contains("Lake &amp; Dam"));
    }

    #[test]
    fn test_empty_visitor_produces_nothing() {
        let xml = XmlVisitor::new(Vec::new());
        assert!(xml.finish().unwrap().is_empty());
    }
}
