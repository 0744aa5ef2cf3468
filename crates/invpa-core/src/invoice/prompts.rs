//! Instructions sent to the inference service.

use crate::models::invoice::CompanyIdentity;

/// Instruction for partitioning a document's pages into invoices.
pub fn grouping_instruction() -> &'static str {
    r#"You sort scanned business documents. You will receive a sequence of page images, each preceded by a marker of the form "This is Page N.".
Decide which pages belong to the same invoice or receipt. Use the document number and date printed on each page to tell documents apart; continuation pages without a header belong to the document before them.
Answer with a single JSON object. Each key is any label unique to one document (for example its number and date joined by an underscore). Each value is the list of page numbers N, as integers, that make up that document. Every page must appear exactly once.

Example for five pages holding two documents:
{"A-17_2024-02-01": [0, 1, 2], "B-5_2024-02-03": [3, 4]}"#
}

/// Marker placed before the image of page `ordinal` in a grouping request.
pub fn page_marker(ordinal: usize) -> String {
    format!("This is Page {ordinal}.")
}

/// Instruction for reading one invoice from its pages.
pub fn extraction_instruction(company: &CompanyIdentity) -> String {
    format!(
        r#"You are an accountant. The images that follow are pages of ONE invoice or receipt. Read them together and answer with a single JSON object.

Fields:
- "type": integer. 1 for a document that asks for payment (invoice, bill), 2 for proof of a payment already made (receipt, cash slip).
- "number": the document number as printed.
- "date": the issue date, formatted YYYY-MM-DD.
- "total_amount": the grand total payable across all pages, as a number.
- "tax_amount": the total tax (VAT or similar), as a number. Use 0 when none is shown.
- "purpose": two or three words describing what was bought, in the document's language.
- "counterparty": the OTHER party on the document, never our company. Required keys "name", "vat", "country", "address". Add "swift", "iban", "phone", "fax", "email", "website" only when printed.

Our company, given only so you can exclude it:
Name: {name}, VAT: {vat}, Country: {country}, Address: {address}

Example:
{{"type": 1, "number": "2024/0311", "date": "2024-03-11", "total_amount": 615.00, "tax_amount": 115.00, "purpose": "printer toner", "counterparty": {{"name": "Office Supply Ltd", "vat": "GB123456789", "country": "United Kingdom", "address": "1 High Street, Leeds", "iban": "GB29NWBK60161331926819"}}}}"#,
        name = company.name,
        vat = company.vat,
        country = company.country,
        address = company.address,
    )
}

/// Instruction for finding `candidate` among `registry`.
///
/// Both arguments are JSON texts.
pub fn matching_instruction(registry: &str, candidate: &str) -> String {
    format!(
        r#"You deduplicate business entities. Below is a list of known companies, each with an "id", followed by a newly extracted company.
Decide whether the new company is the same legal entity as one of the known ones. Names may differ in spelling, abbreviation, legal form or language; a matching tax id (vat) is strong evidence, a different non-empty tax id is strong evidence against.

Known companies:
{registry}

New company:
{candidate}

Answer with a single JSON object: {{"match_found": true, "matched_id": "<id of the known company>"}} when they are the same entity, otherwise {{"match_found": false, "matched_id": ""}}."#
    )
}
