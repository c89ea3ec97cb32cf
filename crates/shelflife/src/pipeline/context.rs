use crate::inventory::InventoryItem;
use crate::parser::{ParsedLineItem, ReceiptHeader};
use crate::processor::OcrOutput;
use crate::receipt::Receipt;

use super::error::PipelineWarning;

#[derive(Debug)]
pub struct PipelineContext {
    // Input, kept in sync with what the store holds
    pub receipt: Receipt,

    // Extract-text step results
    pub ocr: Option<OcrOutput>,
    pub header: ReceiptHeader,

    // Parse step result; categories are filled in by the predict step
    pub parsed: Vec<ParsedLineItem>,

    // Predict step result, written by the persist step
    pub items: Vec<InventoryItem>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(receipt: Receipt) -> Self {
        Self {
            receipt,
            ocr: None,
            header: ReceiptHeader::default(),
            parsed: Vec::new(),
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
