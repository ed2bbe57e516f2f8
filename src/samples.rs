//! Sample lessons for demos and tests.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};

use crate::lesson::{ImageRef, LessonDocument, LessonSection};

fn section(heading: &str, body: &str) -> LessonSection {
    LessonSection {
        heading: heading.to_string(),
        body: body.to_string(),
        illustration: None,
    }
}

/// A short lesson that fits on one or two pages.
pub fn heart_lesson() -> LessonDocument {
    LessonDocument {
        title: "Srce i Krvni Sudovi".to_string(),
        introduction: section(
            "Uvod",
            "Srce je mišićni organ koji pumpa krv kroz krvne sudove.\n\
             Ova lekcija opisuje osnovnu građu srca i njegu pacijenta nakon zahvata.",
        ),
        anatomy: section(
            "Anatomija",
            "Srce ima četiri šupljine: dvije pretkomore i dvije komore. \
             Desna strana prima vensku krv iz tijela, a lijeva potiskuje arterijsku krv u aortu.",
        ),
        technique: section(
            "Tehnika",
            "Pacijent leži na leđima s blago podignutim uzglavljem. \
             Prije zahvata provjeriti identitet, alergije i potpisani pristanak.\n\
             Pristup se označava sterilnim markerom i koža se dezinficira.",
        ),
        risks: section(
            "Rizici",
            "Krvarenje na mjestu uboda, infekcija i poremećaji ritma.",
        ),
        aftercare: section(
            "Njega nakon zahvata",
            "Pratiti vitalne znakove svakih petnaest minuta tokom prvog sata.\n\
             Mjesto uboda držati suhim i pod kompresijom.",
        ),
    }
}

/// A lesson long enough to span several pages.
pub fn long_lesson() -> LessonDocument {
    let paragraph = "Svaki korak se izvodi polako i uz stalnu provjeru stanja pacijenta. \
                     Medicinska sestra bilježi vrijeme, dozu i reakciju na terapiju, \
                     te o svakoj promjeni odmah obavještava nadležnog ljekara.";
    let body = |n: usize| vec![paragraph; n].join("\n");

    LessonDocument {
        title: "Postavljanje Centralnog Venskog Katetera".to_string(),
        introduction: section("Uvod", &body(6)),
        anatomy: section("Anatomija", &body(9)),
        technique: section("Tehnika", &body(14)),
        risks: section("Rizici", &body(8)),
        aftercare: section("Njega nakon zahvata", &body(10)),
    }
}

/// A solid-colour PNG of `width` × `height` as a `data:` URI.
pub fn solid_png_data_uri(width: u32, height: u32, rgb: [u8; 3]) -> ImageRef {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut png = Cursor::new(Vec::new());
    if let Err(e) = img.write_to(&mut png, ImageFormat::Png) {
        log::warn!("sample illustration encode failed: {e}");
    }
    ImageRef::new(format!(
        "data:image/png;base64,{}",
        BASE64_STD.encode(png.into_inner())
    ))
}
