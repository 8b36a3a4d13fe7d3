//! Selector-fallback chains for every control the engine touches.
//!
//! Each list is ordered by priority. Candidates are tried in turn by
//! [`ControlProbe`](super::probe::ControlProbe); the first one that resolves wins.

use super::probe::Selector;

pub const POST_LOGIN_MARKERS: &[Selector] = &[
    Selector::css("user menu button", "button[data-testid='user-menu']"),
    Selector::css("user avatar", ".user-menu, .user-avatar"),
    Selector::css("app header", "header .app-header-user"),
];

pub const USERNAME_INPUTS: &[Selector] = &[
    Selector::css("named username input", "input[name='username']"),
    Selector::css("named login input", "input[name='login']"),
    Selector::css("email input", "input[type='email']"),
];

pub const PASSWORD_INPUTS: &[Selector] = &[
    Selector::css("named password input", "input[name='password']"),
    Selector::css("password input", "input[type='password']"),
];

pub const LOGIN_BUTTONS: &[Selector] = &[
    Selector::css("submit button", "button[type='submit']"),
    Selector::css("submit input", "input[type='submit']"),
    Selector::xpath("'Se connecter' button", "//button[contains(normalize-space(.), 'Se connecter')]"),
    Selector::xpath("'Connexion' button", "//button[contains(normalize-space(.), 'Connexion')]"),
    Selector::xpath("'Log in' button", "//button[contains(normalize-space(.), 'Log in')]"),
];

pub const LOGIN_ERROR_MESSAGES: &[Selector] = &[
    Selector::css("alert", "[role='alert']"),
    Selector::css("error message", ".error-message, .login-error, .alert-danger"),
];

pub const USER_MENUS: &[Selector] = &[
    Selector::css("user menu button", "button[data-testid='user-menu']"),
    Selector::css("user menu", ".user-menu"),
    Selector::css("user avatar", ".user-avatar"),
    Selector::xpath("account dropdown", "//button[contains(@aria-label, 'Mon compte') or contains(@aria-label, 'Account')]"),
];

pub const ADMIN_ENTRIES: &[Selector] = &[
    Selector::xpath("'Administration' menu item", "//*[@role='menuitem'][contains(normalize-space(.), 'Administration')]"),
    Selector::xpath("'Administration' link", "//a[contains(normalize-space(.), 'Administration')]"),
    Selector::css("admin href", "a[href*='admin']"),
];

pub const ADMIN_PAGE_MARKERS: &[Selector] = &[
    Selector::css("admin navigation", "nav.admin-navigation, .administration-menu"),
    Selector::xpath("administration heading", "//h1[contains(normalize-space(.), 'Administration')]"),
];

pub const IMPORT_SECTION_LINKS: &[Selector] = &[
    Selector::xpath("'Formats d'import' link", "//a[contains(normalize-space(.), \"Formats d'import\")]"),
    Selector::xpath("'Import' link", "//a[contains(normalize-space(.), 'Import')]"),
    Selector::css("import href", "a[href*='import']"),
];

pub const FORMAT_GRID_CONTAINERS: &[Selector] = &[
    Selector::css("formats grid", "table.formats-grid"),
    Selector::css("format list", ".import-format-list"),
];

/// Item selector for the paginated format grid.
pub const FORMAT_LINKS: &str = "table.formats-grid tbody tr td a, .import-format-list a.format-link";

pub const NEXT_PAGE_CONTROLS: &[Selector] = &[
    Selector::css("pagination next", "button.pagination-next"),
    Selector::css("aria next", "button[aria-label='Page suivante'], button[aria-label='Next page']"),
    Selector::css("next list item", "li.next > a"),
];

pub const CONFIGURATION_TABLE: &[Selector] = &[
    Selector::css("configuration table", "table.format-configuration"),
    Selector::css("field table", "table.import-fields"),
    Selector::css("any data table", "main table"),
];

/// Item selector for configuration table rows.
pub const CONFIGURATION_ROWS: &str = "table tbody tr";

pub const HEADER_CELLS: &str = "table thead th";
pub const HEADER_LABEL_SPAN: &str = "span.header-label";

pub const CELL_TEXT_SPANS: &str = "span:not(.boolean-indicator)";
pub const CELL_BOOLEAN_INDICATOR: &str = "span.boolean-indicator";
/// Class names marking a boolean indicator as checked.
pub const BOOLEAN_CHECKED_CLASSES: &[&str] = &["checked", "is-true", "active"];

pub const IMPORT_LAUNCH_LINKS: &[Selector] = &[
    Selector::xpath("'Nouvel import' button", "//button[contains(normalize-space(.), 'Nouvel import')]"),
    Selector::xpath("'Lancer un import' link", "//a[contains(normalize-space(.), 'Lancer un import')]"),
    Selector::css("new import action", "[data-testid='new-import'], a.new-import"),
];

pub const FORMAT_COMBOBOXES: &[Selector] = &[
    Selector::css("combobox input", "input[role='combobox']"),
    Selector::css("format select input", ".format-select input"),
    Selector::xpath("labelled combobox", "//label[contains(., 'Format')]/following::input[1]"),
];

pub const FILE_INPUTS: &[Selector] = &[
    Selector::css("file input", "input[type='file']"),
];

pub const DROP_ZONES: &[Selector] = &[
    Selector::css("drop zone", ".dropzone, .file-drop-zone"),
    Selector::css("drop zone role", "[data-testid='file-drop']"),
    Selector::xpath("'Parcourir' button", "//button[contains(normalize-space(.), 'Parcourir')]"),
];

pub const ROLLBACK_RADIOS: &[Selector] = &[
    Selector::css("rollback radio value", "input[type='radio'][value*='rollback' i]"),
    Selector::xpath("'avec rollback' label", "//label[contains(translate(., 'ROLLBACK', 'rollback'), 'avec rollback')]//input[@type='radio']"),
    Selector::xpath("'rollback' label sibling", "//label[contains(translate(., 'ROLLBACK', 'rollback'), 'rollback')]/preceding-sibling::input[@type='radio'][1]"),
];

pub const SUBMIT_BUTTONS: &[Selector] = &[
    Selector::xpath("'Importer' button", "//button[contains(normalize-space(.), 'Importer')]"),
    Selector::xpath("'Lancer' button", "//button[contains(normalize-space(.), 'Lancer')]"),
    Selector::css("submit button", "form button[type='submit']"),
];

pub const RESULT_ARTIFACT_LINKS: &[Selector] = &[
    Selector::css("download link", "a[download]"),
    Selector::xpath("'Télécharger le résultat' link", "//a[contains(normalize-space(.), 'Télécharger')]"),
    Selector::css("result href", "a[href*='result']"),
];

pub const COMPLETION_MARKERS: &[Selector] = &[
    Selector::xpath("'Import terminé' text", "//*[contains(normalize-space(text()), 'Import terminé')]"),
    Selector::xpath("'Terminé' status", "//*[contains(@class, 'status')][contains(normalize-space(.), 'Terminé')]"),
    Selector::xpath("'completed' text", "//*[contains(normalize-space(text()), 'Import completed')]"),
];

pub const FAILURE_MARKERS: &[Selector] = &[
    Selector::xpath("'Échec' text", "//*[contains(normalize-space(text()), 'Échec')]"),
    Selector::css("error status", ".import-status.error, .import-error"),
    Selector::xpath("'failed' text", "//*[contains(normalize-space(text()), 'Import failed')]"),
];

pub const PROGRESS_BARS: &[Selector] = &[
    Selector::css("progress bar", "[role='progressbar']"),
    Selector::css("progress element", "progress"),
];
