/*!
# Sheetmail

A browser-based mail-merge dashboard: upload a spreadsheet, narrow it down
with column filters, download the result, and email the people listed in it.

## Overview

A user uploads an Excel, OpenDocument or CSV file. They then add any number
of filter rows, each of which picks a column and one of the values that
column contains. The filters are combined with AND to produce a preview
table, which can be downloaded as `filtered_data.xlsx`. Finally, up to two
name/email column pairs are chosen and every remaining row receives a
templated plain-text email, sent one by one through SMTP.

## Architecture

```text
 upload bytes
      │
      ▼
 ┌──────────┐
 │  loader  │  xlsx/xls/xlsb/ods/csv → Table
 └──────────┘
      │
      ▼
 ┌──────────┐   add / remove / set column / set value
 │  filter  │◄────────────────────────────────────── user
 └──────────┘
      │
      ▼
 ┌───────────┐
 │ evaluator │  AND of equality filters → filtered Table
 └───────────┘
      │
      ├──────────────► downloader (filtered_data.xlsx)
      ▼
 ┌────────────┐   ┌──────────┐   ┌──────────┐
 │ recipients │──►│ template │──►│  mailer  │  one SMTP send per job
 └────────────┘   └──────────┘   └──────────┘
```

All of a user's state lives in a [`session::Session`]; the web layer keeps
one per browser cookie.

## Modules

- **cell**: scalar cell values
- **table**: the in-memory sheet
- **loader**: spreadsheet decoding
- **filter**: the filter set and each filter's value domain
- **evaluator**: applying filters to a table
- **downloader**: XLSX/CSV export
- **recipients**: turning rows into send jobs
- **template**: placeholder substitution
- **mailer**: the dispatcher interface and its SMTP implementation
- **campaign**: the sequential send run
- **session**: per-user state and the dashboard operations
- **license**: license-key gate
- **config**: runtime settings
- **app**: routing and handlers (feature `web`)

## REST API Endpoints

- `POST /api/license` - Activate a license key
- `POST /api/upload` - Upload a spreadsheet (multipart field `file`)
- `GET /api/columns` - Columns of the uploaded sheet
- `GET|POST /api/filters` - List / add filters
- `DELETE /api/filters/{id}` - Remove a filter
- `PUT /api/filters/{id}/column`, `PUT /api/filters/{id}/value` - Edit a filter
- `POST /api/apply` - Apply filters and return the preview
- `GET /api/download[?format=csv]` - Download the preview as XLSX (or CSV)
- `POST /api/send` - Send the emails
*/

pub mod campaign;
pub mod cell;
pub mod config;
pub mod downloader;
pub mod evaluator;
pub mod filter;
pub mod license;
pub mod loader;
pub mod mailer;
pub mod recipients;
pub mod session;
pub mod table;
pub mod template;

#[cfg(feature = "web")]
pub mod app;

/// Re-export the types most callers need
pub use cell::CellValue;
pub use config::Config;
pub use filter::{Filter, FilterId, FilterSet};
pub use mailer::{EmailDispatcher, SmtpDispatcher};
pub use recipients::{RecipientPair, SendJob, SenderContext};
pub use session::{SendRequest, Session};
pub use table::Table;
pub use template::{TemplateError, TemplateVariables};
