//! The `Poytakirja` (minutes) document layout.

use super::context::{OnMissing, ParseContext};
use super::fields::{
    attendee_category, parse_funcid, parse_guid, parse_name, parse_number, resolution_from_text,
};
use super::tree::Element;
use super::ParseError;
use crate::datetime::{parse_datetime_range, parse_iso_date, parse_timestamp};
use crate::schema::{
    Action, Attachment, Attendee, AttendeeCategory, DecisionDocument, DocumentType, Event, Severity,
};
use quick_xml::escape::escape;

use OnMissing::{Ignore, Report};

const STANDARD_DECISION: &str = "vakiopäätös";
const OFFICE_HOLDER_ROLE: &str = "office holder";

pub(super) fn parse_minutes(ctx: &mut ParseContext, root: &Element) -> Result<DecisionDocument, ParseError> {
    let cover = root.find("PkKansilehtiSektio/KansilehtiToisto");
    let header = root.find("YlatunnisteSektio");
    let mut event = parse_event(ctx, cover, header)?;

    let mut actions = Vec::new();
    match root.find("Paatokset") {
        Some(container) => {
            for element in &container.children {
                actions.push(parse_action(ctx, element)?);
            }
        }
        None => ctx.critical("Element Paatokset not found")?,
    }
    ctx.current_action = None;

    add_office_holder(ctx, root, &mut event.attendees)?;

    Ok(DecisionDocument {
        document_type: DocumentType::Minutes,
        event,
        actions,
        errors: Vec::new(),
    })
}

/// Merges the cover sheet (roster, place, time) with the page header
/// (decision maker and document id).
fn parse_event(
    ctx: &mut ParseContext,
    cover: Option<&Element>,
    header: Option<&Element>,
) -> Result<Event, ParseError> {
    let mut attendees = Vec::new();
    let mut location = None;
    let mut range = None;

    if let Some(cover) = cover {
        match cover.find("Lasnaolotiedot") {
            Some(roster) => attendees = parse_attendees(ctx, roster)?,
            None => ctx.warning("Element Lasnaolotiedot not found")?,
        }
        if let Some(meeting) = cover.find("Kokoustiedot") {
            location = ctx.text(meeting, "Kokouspaikka", Ignore)?;
            let when = ctx.text(meeting, "Kokousaika", Ignore)?;
            range = parse_datetime_range(when.as_deref());
        }
    }

    let mut name_parts = Vec::new();
    let mut day = None;
    if let Some(header) = header {
        for path in ["Paattaja", "Asiakirjatunnus"] {
            name_parts.extend(ctx.text(header, path, Ignore)?);
        }
        day = ctx.get(header, "Paivays", Ignore, |raw| Ok(parse_iso_date(raw)))?.flatten();
    }

    let (start_date, end_date) = match (range, day) {
        (Some(range), _) => range,
        (None, Some(day)) => (day.midnight(), day.midnight()),
        (None, None) => return Err(ParseError::NoDateInformation),
    };

    Ok(Event {
        name: name_parts.join(" "),
        location,
        start_date,
        end_date,
        attendees,
    })
}

fn parse_attendees(ctx: &mut ParseContext, roster: &Element) -> Result<Vec<Attendee>, ParseError> {
    let mut attendees = Vec::new();
    for group in roster.descendants("Osallistujaryhma") {
        let heading = ctx.text(group, "OsallistujaryhmaOtsikko", Report(Severity::Error))?;
        let category = attendee_category(heading.as_deref());

        for person in group.children_named("Osallistujat") {
            let Some(name) = person.find("Nimi").and_then(Element::trimmed_text) else {
                ctx.warning("Attendee doesn't have a name")?;
                continue;
            };
            let role = match person.find("OsallistujaOptiot") {
                Some(options) => ctx.text(options, "Rooli", Ignore)?,
                None => None,
            };
            attendees.push(Attendee {
                name: parse_name(name),
                role,
                title: ctx.text(person, "Titteli", Ignore)?,
                category,
            });
        }
    }
    Ok(attendees)
}

fn parse_action(ctx: &mut ParseContext, element: &Element) -> Result<Action, ParseError> {
    ctx.current_action = None;
    let Some(meta) = element.find("KuvailutiedotOpenDocument") else {
        ctx.critical("Element KuvailutiedotOpenDocument not found")?;
        return Ok(Action::default());
    };

    let standard = ctx
        .text(meta, "AsiakirjallinenTieto", Ignore)?
        .is_some_and(|info| info.contains(STANDARD_DECISION));
    // Standard decisions have no case behind them.
    let case_field = if standard { Ignore } else { Report(Severity::Error) };

    let title = ctx.text(meta, "Otsikko", Report(Severity::Warning))?;
    ctx.current_action = title.clone();

    let (function_id, function_name) = match ctx.text(meta, "Tehtavaluokka", Report(Severity::Warning))? {
        Some(raw) => match parse_funcid(&raw) {
            Some((id, name)) => (Some(id), Some(name).filter(|n| !n.is_empty())),
            None => {
                ctx.warning(format!("Unknown function class format: {raw}"))?;
                (None, None)
            }
        },
        None => (None, None),
    };

    let case_guid = ctx.get(meta, "AsiaGuid", case_field, parse_guid)?;
    let date = ctx.get(meta, "Paatospaiva", Report(Severity::Error), |raw| {
        parse_timestamp(raw).ok_or_else(|| ParseError::UnknownTimestamp(raw.to_string()))
    })?;
    let article_number = ctx.get(meta, "Pykala", Report(Severity::Error), |raw| parse_number("Pykala", raw))?;
    let register_id = ctx.text(meta, "Dnro/DnroLyhyt", case_field)?;

    let resolution = match ctx.text(meta, "Asiakirjantila", Report(Severity::Warning))? {
        Some(raw) => {
            let resolution = resolution_from_text(&raw);
            if resolution.is_none() {
                ctx.warning(format!("Unknown resolution type: {raw}"))?;
            }
            resolution
        }
        None => None,
    };

    let content = parse_content(ctx, element.find("SisaltoSektioToisto"))?;
    let keywords = element
        .children_named("Asiasana")
        .filter_map(Element::trimmed_text)
        .map(str::to_string)
        .collect();

    let mut attachments = Vec::new();
    for attachment in element.findall("LiitteetOptio/Liitteet/LiitteetToisto") {
        attachments.push(Attachment {
            id: ctx.get(attachment, "LiitteetId", Ignore, parse_guid)?,
            name: ctx.text(attachment, "Liiteteksti", Ignore)?,
            ordering: ctx.get(attachment, "Liitenumero", Ignore, |raw| parse_number("Liitenumero", raw))?,
        });
    }

    Ok(Action {
        title,
        function_id,
        function_name,
        case_guid,
        register_id,
        date,
        article_number,
        resolution,
        content,
        keywords,
        attachments,
    })
}

/// Renders the first content section as an HTML fragment.
fn parse_content(ctx: &mut ParseContext, container: Option<&Element>) -> Result<Option<String>, ParseError> {
    let Some(section) = container.and_then(|c| c.children.first()) else {
        return Ok(None);
    };
    let sections = container.map_or(0, |c| c.children.len());
    if sections > 1 {
        ctx.info(format!("Content has {sections} sections, only the first is used"))?;
    }

    let mut html = String::new();
    if let Some(heading) = ctx.text(section, "SisaltoOtsikko", Ignore)? {
        html.push_str(&format!("<h2>{}</h2>\n", escape(heading.as_str())));
    }
    if let Some(level) = section.find("TekstiSektio/taso1") {
        for block in &level.children {
            match block.name.as_str() {
                "Kappale" => {
                    if let Some(text) = ctx.text(block, "KappaleTeksti", Ignore)? {
                        html.push_str(&format!("<p>{}</p>\n", escape(text.as_str())));
                    }
                }
                "Otsikko" => {
                    if let Some(text) = block.trimmed_text() {
                        html.push_str(&format!("<h3>{}</h3>\n", escape(text)));
                    }
                }
                "XHTML" => html.push_str(&block.inner_xml()),
                _ => {}
            }
        }
    }
    Ok(Some(html))
}

/// Decisions signed by a single office holder carry the plain signature
/// section; the signer then attends the "meeting" alone.
fn add_office_holder(
    ctx: &mut ParseContext,
    root: &Element,
    attendees: &mut Vec<Attendee>,
) -> Result<(), ParseError> {
    if root.find("SahkoinenAllekirjoitusSektio").is_some() {
        return Ok(());
    }
    let Some(signatures) = root.find("AllekirjoitusSektio") else {
        return Ok(());
    };
    let name = ctx.get(
        signatures,
        "PuheenjohtajaSektio/PuheenjohtajaToisto/Puheenjohtajanimi",
        Report(Severity::Warning),
        |raw| Ok(parse_name(raw)),
    )?;
    if let Some(name) = name {
        if !attendees.iter().any(|a| a.name == name) {
            attendees.push(Attendee {
                name,
                role: Some(OFFICE_HOLDER_ROLE.to_string()),
                title: None,
                category: AttendeeCategory::Participant,
            });
        }
    }
    Ok(())
}
