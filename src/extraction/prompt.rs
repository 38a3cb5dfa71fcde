//! Extraction prompt.

/// Upper bound on OCR characters sent to the model.
pub const MAX_PROMPT_TEXT_CHARS: usize = 30_000;

pub fn build_extraction_system_prompt() -> String {
    r#"You read OCR text of supplier documents (invoices, credit notes, quotes, delivery notes) and return the data as one JSON object.

Respond with JSON only, using exactly this shape:
{
  "supplier": {
    "name": string | null,
    "email": string | null,
    "phone": string | null,
    "address": string | null,
    "vat_number": string | null,
    "iban": string | null,
    "bic": string | null
  },
  "invoice": {
    "number": string | null,
    "date": "YYYY-MM-DD" | null,
    "due_date": "YYYY-MM-DD" | null,
    "reference": string | null,
    "document_type": "factuur" | "creditnota" | "leveringsbon" | "pakbon" | "afhaalbon" | "bestelbon" | "offerte" | "onbekend"
  },
  "totals": {
    "subtotal_excl_vat": number | null,
    "vat_amount": number | null,
    "discount_total": number | null,
    "total_amount": number | null
  },
  "payment": {
    "iban": string | null,
    "bic": string | null,
    "payment_reference": string | null,
    "payment_terms": string | null
  },
  "line_items": [
    {
      "sku": string | null,
      "name": string,
      "quantity": number,
      "unit": string | null,
      "gross_unit_price": number | null,
      "discount": number | null,
      "unit_price": number,
      "total_price": number,
      "vat_rate": number,
      "category": string | null
    }
  ],
  "confidence": number between 0 and 1,
  "notes": string | null
}

Rules:
- All amounts are in EUR, as plain JSON numbers with two decimals. No currency symbols, no thousands separators.
- unit_price is the net price per unit: gross_unit_price minus discount.
- total_price is unit_price multiplied by quantity.
- Dates use ISO format YYYY-MM-DD.
- vat_rate is a percentage (21, 12, 6 or 0). Use 21 when the document does not state it.
- The supplier is the party that issued the document, never the customer it is addressed to.
- Use null for anything you cannot find. Do not invent values.
- confidence reflects how certain you are about supplier, totals and line items together.
- Put anything unusual (multiple documents, unreadable sections, currency other than EUR) in notes."#
        .to_string()
}

pub fn build_extraction_user_prompt(ocr_text: &str) -> String {
    let text = if ocr_text.chars().count() > MAX_PROMPT_TEXT_CHARS {
        let truncated: String = ocr_text.chars().take(MAX_PROMPT_TEXT_CHARS).collect();
        format!("{truncated}\n[... truncated]")
    } else {
        ocr_text.to_string()
    };
    format!("Extract the document data from this OCR text:\n\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_states_numeric_rules() {
        let prompt = build_extraction_system_prompt();
        assert!(prompt.contains("EUR"));
        assert!(prompt.contains("two decimals"));
        assert!(prompt.contains("gross_unit_price minus discount"));
        assert!(prompt.contains("unit_price multiplied by quantity"));
        assert!(prompt.contains("YYYY-MM-DD"));
        assert!(prompt.contains("Use 21"));
    }

    #[test]
    fn user_prompt_truncates_long_text() {
        let prompt = build_extraction_user_prompt(&"x".repeat(MAX_PROMPT_TEXT_CHARS + 500));
        assert!(prompt.ends_with("[... truncated]"));
        assert!(prompt.len() < MAX_PROMPT_TEXT_CHARS + 100);
    }

    #[test]
    fn user_prompt_keeps_short_text() {
        let prompt = build_extraction_user_prompt("Factuur 2024-001");
        assert!(prompt.ends_with("Factuur 2024-001"));
    }
}
