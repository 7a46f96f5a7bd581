use chrono::NaiveDate;
use encoding_rs::WINDOWS_1252;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use tracing::{info, instrument};

use crate::error::AppError;

// Landscape A4 in points.
const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;
const MAX_LINE_CHARS: usize = 80;

pub struct CertificateDocument<'a> {
    pub student_name: &'a str,
    pub course_name: &'a str,
    pub certificate_text: &'a str,
    pub award_date: NaiveDate,
    pub public_id: &'a str,
}

pub fn certificate_text(
    course_name: &str,
    description: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> String {
    format!(
        "For completing {} Course with focus on {}, from {} until {}",
        course_name,
        description,
        start_date.format("%Y-%m-%d"),
        end_date.format("%Y-%m-%d")
    )
}

pub fn display_id(public_id: &str) -> String {
    let prefix: String = public_id.chars().take(8).collect();
    format!("CERT-{}", prefix.to_uppercase())
}

/// Whitespace runs become `_`; anything but letters, digits, `-` and `.` is dropped
/// so the name is safe inside a quoted header value.
pub fn download_filename(student_name: &str, course_name: &str) -> String {
    let underscored = |s: &str| {
        s.split_whitespace()
            .map(|word| {
                word.chars()
                    .filter(|c| c.is_alphanumeric() || matches!(*c, '-' | '.'))
                    .collect::<String>()
            })
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    };
    format!(
        "{}_{}_Certificate.pdf",
        underscored(student_name),
        underscored(course_name)
    )
}

/// Encodes text for the standard Helvetica fonts, which only cover WinAnsi.
/// Text outside that character set is rejected rather than printed garbled.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>, AppError> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors || text.chars().any(char::is_control) {
        return Err(AppError::Validation(format!(
            "'{}' contains characters that cannot be printed on a certificate",
            text
        )));
    }
    Ok(bytes.into_owned())
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn centered_text(
    ops: &mut Vec<Operation>,
    font: &str,
    size: f32,
    y: f32,
    text: &str,
) -> Result<(), AppError> {
    let encoded = encode_win_ansi(text)?;
    // Helvetica averages roughly half an em per glyph.
    let estimated_width = text.chars().count() as f32 * size * 0.5;
    let x = ((PAGE_WIDTH - estimated_width) / 2.0).max(36.0);

    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(font.as_bytes().to_vec()), size.into()],
    ));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encoded, StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
    Ok(())
}

#[instrument(skip(cert), fields(public_id = %cert.public_id))]
pub fn render_pdf(cert: &CertificateDocument<'_>) -> Result<Vec<u8>, AppError> {
    info!("Rendering certificate PDF");

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut ops = vec![
        // Border
        Operation::new("w", vec![4.into()]),
        Operation::new(
            "re",
            vec![
                24.into(),
                24.into(),
                (PAGE_WIDTH - 48.0).into(),
                (PAGE_HEIGHT - 48.0).into(),
            ],
        ),
        Operation::new("S", vec![]),
    ];

    centered_text(&mut ops, "F2", 40.0, 470.0, "Certificate of Completion")?;
    centered_text(&mut ops, "F1", 16.0, 420.0, "This certificate is proudly presented to")?;
    centered_text(&mut ops, "F2", 32.0, 370.0, cert.student_name)?;
    centered_text(&mut ops, "F2", 20.0, 320.0, cert.course_name)?;

    let mut y = 280.0;
    for line in wrap(cert.certificate_text, MAX_LINE_CHARS) {
        centered_text(&mut ops, "F1", 14.0, y, &line)?;
        y -= 20.0;
    }

    let awarded = format!("Awarded on: {}", cert.award_date.format("%Y-%m-%d"));
    centered_text(&mut ops, "F1", 12.0, 110.0, &awarded)?;
    let cert_id = format!("Certificate ID: {}", display_id(cert.public_id));
    centered_text(&mut ops, "F1", 10.0, 80.0, &cert_id)?;

    let content = Content { operations: ops };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| AppError::Internal(format!("Failed to write certificate PDF: {}", e)))?;

    Ok(buffer)
}
