//! XML rendering of a context graph

use crate::graph::attrs::AttrScope;
use crate::graph::channel::Channel;
use crate::graph::context::Context;
use crate::graph::device::Device;
use std::fmt::Write;

/// Escape the five XML special characters
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn render(ctx: &Context) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    // Writing to a String cannot fail
    let _ = write!(
        out,
        "<context name=\"{}\" description=\"{}\" version-major=\"{}\" version-minor=\"{}\" version-git=\"{}\">",
        escape(ctx.name()),
        escape(ctx.description()),
        ctx.version().major,
        ctx.version().minor,
        escape(&ctx.version().git_tag),
    );
    for dev in ctx.devices() {
        render_device(&mut out, dev);
    }
    out.push_str("</context>");
    out
}

fn render_device(out: &mut String, dev: &Device) {
    let _ = write!(out, "<device id=\"{}\"", escape(dev.id()));
    if let Some(name) = dev.name() {
        let _ = write!(out, " name=\"{}\"", escape(name));
    }
    out.push('>');
    for chn in dev.channels() {
        render_channel(out, chn);
    }
    render_attrs(out, "attribute", dev.attrs());
    render_attrs(out, "debug-attribute", dev.debug_attrs());
    out.push_str("</device>");
}

fn render_channel(out: &mut String, chn: &Channel) {
    let _ = write!(out, "<channel id=\"{}\"", escape(chn.id()));
    if let Some(name) = chn.name() {
        let _ = write!(out, " name=\"{}\"", escape(name));
    }
    let _ = write!(out, " type=\"{}\">", chn.direction());
    if let (Some(index), Some(format)) = (chn.index(), chn.data_format()) {
        let _ = write!(out, "<scan-element index=\"{}\" format=\"{}\"", index, format);
        if format.with_scale {
            let _ = write!(out, " scale=\"{}\"", format.scale);
        }
        out.push_str("/>");
    }
    for entry in chn.attrs().entries() {
        let _ = write!(
            out,
            "<attribute name=\"{}\" filename=\"{}\"/>",
            escape(&entry.name),
            escape(&entry.filename)
        );
    }
    out.push_str("</channel>");
}

fn render_attrs(out: &mut String, tag: &str, scope: &AttrScope) {
    for name in scope.names() {
        let _ = write!(out, "<{} name=\"{}\"/>", tag, escape(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::description::{
        AttrDescription, ChannelDescription, ContextDescription, DeviceDescription,
    };
    use crate::backend::SimulatedBackend;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_render_tree() {
        let desc = ContextDescription::new("sim")
            .with_description("bench & rig")
            .with_device(
                DeviceDescription::new("iio:device0")
                    .with_name("adc")
                    .with_channel(
                        ChannelDescription::input("voltage0")
                            .scan_element(0, "le:s12/16>>4")
                            .with_scale(0.5)
                            .with_attr(AttrDescription::new("raw").with_filename("in_voltage0_raw")),
                    )
                    .with_attr(AttrDescription::new("sampling_frequency"))
                    .with_debug_attr(AttrDescription::new("direct_reg_access")),
            );
        let ctx = Context::new(SimulatedBackend::new(desc)).unwrap();
        let xml = render(&ctx);

        assert!(xml.contains("description=\"bench &amp; rig\""));
        assert!(xml.contains("<channel id=\"voltage0\" type=\"input\">"));
        assert!(xml.contains("<scan-element index=\"0\" format=\"le:s12/16>>4\" scale=\"0.5\"/>"));
        assert!(xml.contains("<attribute name=\"raw\" filename=\"in_voltage0_raw\"/>"));
        assert!(xml.contains("<attribute name=\"sampling_frequency\"/>"));
        assert!(xml.contains("<debug-attribute name=\"direct_reg_access\"/>"));
        assert!(xml.ends_with("</device></context>"));
    }
}
