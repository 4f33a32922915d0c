//! # PDF Invoice Generator
//!
//! Renders an invoice document as a self-contained PDF 1.4 file using the
//! standard Type 1 fonts, so no font files or external tools are needed.
//!
//! Output is deterministic: the same document always yields the same bytes,
//! which keeps the data carrier Secret stable across reconcile passes.

use super::{parse_document, DocumentGenerator, GenerationError};
use crate::crd::{InvoiceData, Party};
use std::fmt::Write as _;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN_LEFT: f32 = 50.0;
const MARGIN_TOP: f32 = 60.0;
const MARGIN_BOTTOM: f32 = 60.0;
const DESCRIPTION_MAX_CHARS: usize = 38;

/// Item table columns: label and x offset
const COLUMNS: [(&str, f32); 7] = [
    ("#", 50.0),
    ("Description", 70.0),
    ("Qty", 290.0),
    ("Unit price", 330.0),
    ("VAT", 400.0),
    ("Net", 440.0),
    ("Gross", 510.0),
];

/// PDF generator backed by the built-in Type 1 fonts
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfInvoiceGenerator;

impl PdfInvoiceGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentGenerator for PdfInvoiceGenerator {
    fn generate(&self, document: &str) -> Result<Vec<u8>, GenerationError> {
        let data = parse_document(document)?;
        let fonts = FontFamily::from_option(data.options.font.as_deref());
        let pages = render_pages(&data);
        Ok(write_pdf(&pages, fonts))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontFamily {
    Helvetica,
    Times,
    Courier,
}

impl FontFamily {
    fn from_option(option: Option<&str>) -> Self {
        match option.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
            Some("times" | "times-roman" | "times new roman") => FontFamily::Times,
            Some("courier" | "courier new") => FontFamily::Courier,
            // Arial maps onto Helvetica, the metric-compatible standard font
            _ => FontFamily::Helvetica,
        }
    }

    fn regular(self) -> &'static str {
        match self {
            FontFamily::Helvetica => "Helvetica",
            FontFamily::Times => "Times-Roman",
            FontFamily::Courier => "Courier",
        }
    }

    fn bold(self) -> &'static str {
        match self {
            FontFamily::Helvetica => "Helvetica-Bold",
            FontFamily::Times => "Times-Bold",
            FontFamily::Courier => "Courier-Bold",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Weight {
    Regular,
    Bold,
}

impl Weight {
    fn resource(self) -> &'static str {
        match self {
            Weight::Regular => "/F1",
            Weight::Bold => "/F2",
        }
    }
}

/// Top-down text layout with automatic page breaks
struct Layout {
    pages: Vec<String>,
    current: String,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: String::new(),
            y: PAGE_HEIGHT - MARGIN_TOP,
        }
    }

    /// Place text on the current baseline without advancing
    fn text(&mut self, weight: Weight, size: f32, x: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = writeln!(
            self.current,
            "BT {} {size:.1} Tf {x:.2} {:.2} Td ({}) Tj ET",
            weight.resource(),
            self.y,
            escape_text(text)
        );
    }

    /// Write one line and move to the next baseline
    fn line(&mut self, weight: Weight, size: f32, text: &str) {
        self.ensure_room(size);
        self.text(weight, size, MARGIN_LEFT, text);
        self.advance(size * 1.5);
    }

    fn advance(&mut self, dy: f32) {
        self.y -= dy;
    }

    fn ensure_room(&mut self, size: f32) {
        if self.y - size < MARGIN_BOTTOM {
            self.page_break();
        }
    }

    fn page_break(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN_TOP;
    }

    fn finish(mut self) -> Vec<String> {
        self.pages.push(self.current);
        self.pages
    }
}

fn render_pages(data: &InvoiceData) -> Vec<String> {
    let mut layout = Layout::new();

    layout.line(Weight::Bold, 18.0, &format!("Invoice {}", data.number.trim()));
    layout.advance(6.0);

    for (label, value) in [
        ("Issue date", &data.issue_date),
        ("Sale date", &data.sale_date),
        ("Due date", &data.due_date),
    ] {
        if !value.trim().is_empty() {
            layout.line(Weight::Regular, 10.0, &format!("{label}: {}", value.trim()));
        }
    }
    layout.advance(10.0);

    render_parties(&mut layout, &data.company.seller, &data.company.buyer);
    layout.advance(10.0);

    render_items(&mut layout, data);
    layout.advance(10.0);

    if !data.bank.account_number.trim().is_empty() {
        layout.line(
            Weight::Regular,
            10.0,
            &format!("Bank account: {}", data.bank.account_number.trim()),
        );
    }
    if !data.bank.swift.trim().is_empty() {
        layout.line(
            Weight::Regular,
            10.0,
            &format!("SWIFT: {}", data.bank.swift.trim()),
        );
    }

    if !data.notes.trim().is_empty() {
        layout.advance(6.0);
        layout.line(Weight::Bold, 10.0, "Notes");
        for note in data.notes.lines() {
            layout.line(Weight::Regular, 10.0, note.trim_end());
        }
    }

    if !data.signature.trim().is_empty() {
        layout.advance(24.0);
        layout.line(Weight::Regular, 10.0, data.signature.trim());
    }

    layout.finish()
}

/// Seller on the left, buyer on the right, row by row
fn render_parties(layout: &mut Layout, seller: &Party, buyer: &Party) {
    let column = |title: &str, party: &Party| -> Vec<(Weight, String)> {
        let mut rows = vec![(Weight::Bold, title.to_string())];
        if !party.name.trim().is_empty() {
            rows.push((Weight::Regular, party.name.trim().to_string()));
        }
        rows.extend(
            party
                .address
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| (Weight::Regular, line.to_string())),
        );
        if !party.vat.trim().is_empty() {
            rows.push((Weight::Regular, format!("VAT: {}", party.vat.trim())));
        }
        rows
    };

    let left = column("Seller", seller);
    let right = column("Buyer", buyer);
    for row in 0..left.len().max(right.len()) {
        layout.ensure_room(10.0);
        if let Some((weight, text)) = left.get(row) {
            layout.text(*weight, 10.0, MARGIN_LEFT, text);
        }
        if let Some((weight, text)) = right.get(row) {
            layout.text(*weight, 10.0, PAGE_WIDTH / 2.0 + 20.0, text);
        }
        layout.advance(15.0);
    }
}

fn render_items(layout: &mut Layout, data: &InvoiceData) {
    let header = |layout: &mut Layout| {
        layout.ensure_room(9.0);
        for (label, x) in COLUMNS {
            layout.text(Weight::Bold, 9.0, x, label);
        }
        layout.advance(14.0);
    };
    header(layout);

    let (mut total_net, mut total_vat) = (0.0_f64, 0.0_f64);
    for (index, item) in data.items.iter().enumerate() {
        if layout.y - 9.0 < MARGIN_BOTTOM {
            layout.page_break();
            header(layout);
        }

        let net = item.quantity * item.unit_price;
        let vat = net * item.vat_rate;
        total_net += net;
        total_vat += vat;

        let cells = [
            (index + 1).to_string(),
            truncate(item.description.trim(), DESCRIPTION_MAX_CHARS),
            format_quantity(item.quantity),
            format_amount(item.unit_price),
            format!("{}%", format_quantity(item.vat_rate * 100.0)),
            format_amount(net),
            format_amount(net + vat),
        ];
        for ((_, x), cell) in COLUMNS.iter().zip(cells.iter()) {
            layout.text(Weight::Regular, 9.0, *x, cell);
        }
        layout.advance(13.0);
    }

    let currency = data.currency.trim();
    layout.advance(6.0);
    layout.line(
        Weight::Regular,
        10.0,
        &format!("Total net: {} {currency}", format_amount(total_net)),
    );
    layout.line(
        Weight::Regular,
        10.0,
        &format!("Total VAT: {} {currency}", format_amount(total_vat)),
    );
    layout.line(
        Weight::Bold,
        11.0,
        &format!(
            "Total due: {} {currency}",
            format_amount(total_net + total_vat)
        ),
    );
}

fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

fn format_quantity(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        let formatted = format!("{value:.3}");
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max_chars - 3).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Escape text for a PDF literal string in WinAnsi encoding
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\t' => escaped.push(' '),
            '\u{20AC}' => escaped.push_str("\\200"),
            c if c.is_ascii() && !c.is_ascii_control() => escaped.push(c),
            c if ('\u{A0}'..='\u{FF}').contains(&c) => {
                let _ = write!(escaped, "\\{:03o}", u32::from(c));
            }
            _ => escaped.push('?'),
        }
    }
    escaped
}

/// Serialize pages into a PDF file with a valid cross-reference table
fn write_pdf(pages: &[String], fonts: FontFamily) -> Vec<u8> {
    // 1: catalog, 2: page tree, 3-4: fonts, then a page object and a content stream per page
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 5 + i * 2).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
        format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
            fonts.regular()
        ),
        format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
            fonts.bold()
        ),
    ];
    for (page_id, content) in page_ids.iter().zip(pages) {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.0} {PAGE_HEIGHT:.0}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
            page_id + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ));
    }

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );
    out.extend_from_slice(xref.as_bytes());
    out
}
