pub mod pdf;

pub use pdf::{ sanitize_filename, PdfConverter, PdfDocument, PdfError };
